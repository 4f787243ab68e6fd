/// Unit tests for descriptors and the registry
use tiered_di::{
    AsyncDispose, DescriptorBuilder, DiError, Dispose, Lifetime, ScopeLevel, ServiceKey,
    ServiceRegistry, Teardown,
};

struct Pool;

impl Dispose for Pool {
    fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Socket;

#[async_trait::async_trait]
impl AsyncDispose for Socket {
    async fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn test_builder_defaults() {
    let descriptor = DescriptorBuilder::new()
        .key(&ServiceKey::<Pool>::of_type())
        .factory(|_| Ok(Pool))
        .build()
        .unwrap();

    assert_eq!(descriptor.lifetime(), Lifetime::Transient);
    assert_eq!(descriptor.minimum_level(), None);
    assert!(descriptor.teardown().is_none());
}

#[test]
fn test_builder_carries_every_field() {
    let key = ServiceKey::<Pool>::token("pool");
    let descriptor = DescriptorBuilder::new()
        .key(&key)
        .factory(|_| Ok(Pool))
        .lifetime(Lifetime::Scoped)
        .minimum_level(ScopeLevel::Tenant)
        .disposable()
        .build()
        .unwrap();

    assert_eq!(descriptor.key(), key.key());
    assert_eq!(descriptor.lifetime(), Lifetime::Scoped);
    assert_eq!(descriptor.minimum_level(), Some(ScopeLevel::Tenant));
    assert_eq!(descriptor.effective_minimum_level(), Some(ScopeLevel::Tenant));
    assert!(!descriptor.teardown().unwrap().is_async());

    let info = descriptor.info();
    assert_eq!(info.key, *key.key());
    assert!(info.has_teardown);
}

#[test]
fn test_async_disposable_builds_async_teardown() {
    let descriptor = DescriptorBuilder::new()
        .key(&ServiceKey::<Socket>::of_type())
        .factory(|_| Ok(Socket))
        .lifetime(Lifetime::Singleton)
        .async_disposable()
        .build()
        .unwrap();

    assert!(descriptor.teardown().unwrap().is_async());
    assert!(Teardown::of_async_dispose::<Socket>().is_async());
    assert!(!Teardown::of_dispose::<Pool>().is_async());
}

#[test]
fn test_instance_forces_singleton() {
    let descriptor = DescriptorBuilder::new()
        .key(&ServiceKey::<u32>::of_type())
        .instance(7)
        .build()
        .unwrap();
    assert_eq!(descriptor.lifetime(), Lifetime::Singleton);
}

#[test]
fn test_instance_with_other_lifetime_is_malformed() {
    let result = DescriptorBuilder::new()
        .key(&ServiceKey::<u32>::of_type())
        .instance(7)
        .lifetime(Lifetime::Transient)
        .build();
    assert!(matches!(result, Err(DiError::MalformedDescriptor(_))));
}

#[test]
fn test_registry_keeps_first_registration_order() {
    let mut registry = ServiceRegistry::new();
    let a = ServiceKey::<u8>::token("a");
    let b = ServiceKey::<u8>::token("b");
    let c = ServiceKey::<u8>::token("c");

    for key in [&a, &b, &c] {
        registry
            .register(DescriptorBuilder::new().key(key).factory(|_| Ok(0u8)))
            .unwrap();
    }
    // replacing b keeps its slot
    registry
        .register(
            DescriptorBuilder::new()
                .key(&b)
                .factory(|_| Ok(1u8))
                .lifetime(Lifetime::Singleton),
        )
        .unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(
        registry.all_identifiers(),
        vec![*a.key(), *b.key(), *c.key()]
    );
    assert_eq!(registry.get(b.key()).unwrap().lifetime(), Lifetime::Singleton);

    let names: Vec<_> = registry
        .descriptors()
        .iter()
        .map(|d| d.key.display_name())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_registry_rejects_malformed_without_side_effects() {
    let mut registry = ServiceRegistry::new();
    let result = registry.register(DescriptorBuilder::<u8>::new().factory(|_| Ok(0)));

    assert!(matches!(
        result,
        Err(DiError::MalformedDescriptor("missing service identifier"))
    ));
    assert!(registry.is_empty());
    assert!(registry.all_identifiers().is_empty());
}

#[test]
fn test_registry_lookup_of_unknown_key() {
    let registry = ServiceRegistry::new();
    let key = ServiceKey::<u8>::token("ghost");
    assert!(!registry.has(key.key()));
    assert!(registry.get(key.key()).is_none());
}
