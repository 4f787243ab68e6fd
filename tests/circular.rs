use std::sync::Arc;
use tiered_di::{ContainerOptions, DiError, Resolver, ScopeLevel, ServiceKey, ServiceProvider};

struct A(Arc<B>);
struct B(Arc<A>);

#[test]
fn test_self_dependency_is_detected() {
    let provider = ServiceProvider::new();
    let key = ServiceKey::<u32>::token("Selfish");
    let inner = key.clone();
    provider
        .register_transient(&key, move |scope| Ok(*scope.get_keyed(&inner)?))
        .unwrap();

    match provider.get_keyed(&key) {
        Err(DiError::Circular(path)) => assert_eq!(path, vec!["Selfish", "Selfish"]),
        other => panic!("expected Circular, got {other:?}"),
    }
}

#[test]
fn test_two_node_cycle_reports_path() {
    let a_key = ServiceKey::<A>::token("A");
    let b_key = ServiceKey::<B>::token("B");

    let provider = ServiceProvider::new();
    let b_for_a = b_key.clone();
    provider
        .register_scoped(&a_key, move |scope| Ok(A(scope.get_keyed(&b_for_a)?)), None)
        .unwrap();
    let a_for_b = a_key.clone();
    provider
        .register_scoped(&b_key, move |scope| Ok(B(scope.get_keyed(&a_for_b)?)), None)
        .unwrap();

    let root = provider.root_scope().unwrap();
    let request = provider.create_request_scope(&root, "r1", None).unwrap();

    match request.get_keyed(&a_key) {
        Err(DiError::Circular(path)) => assert_eq!(path, vec!["A", "B", "A"]),
        other => panic!("expected Circular, got {:?}", other.map(|_| ())),
    }
    // a failed construction leaves nothing cached and the scope usable
    assert_eq!(request.cached_count(), 0);
    assert!(matches!(
        request.get_keyed(&b_key),
        Err(DiError::Circular(path)) if path == vec!["B", "A", "B"]
    ));
}

#[test]
fn test_singleton_cycle_does_not_deadlock() {
    let a_key = ServiceKey::<A>::token("A");
    let b_key = ServiceKey::<B>::token("B");

    let provider = ServiceProvider::new();
    let b_for_a = b_key.clone();
    provider
        .register_singleton(&a_key, move |scope| Ok(A(scope.get_keyed(&b_for_a)?)))
        .unwrap();
    let a_for_b = a_key.clone();
    provider
        .register_singleton(&b_key, move |scope| Ok(B(scope.get_keyed(&a_for_b)?)))
        .unwrap();

    let tenant = provider.create_tenant_scope("acme").unwrap();
    let err = tenant.get_keyed(&a_key).map(|_| ()).unwrap_err();
    assert_eq!(err.to_string(), "Circular dependency: A -> B -> A");
}

#[test]
fn test_diamond_is_not_a_cycle() {
    struct Leaf;
    struct Left(Arc<Leaf>);
    struct Right(Arc<Leaf>);
    struct Top(Arc<Left>, Arc<Right>);

    let provider = ServiceProvider::new();
    provider
        .register_scoped(&ServiceKey::<Leaf>::of_type(), |_| Ok(Leaf), None)
        .unwrap();
    provider
        .register_transient(&ServiceKey::<Left>::of_type(), |s| Ok(Left(s.get::<Leaf>()?)))
        .unwrap();
    provider
        .register_transient(&ServiceKey::<Right>::of_type(), |s| Ok(Right(s.get::<Leaf>()?)))
        .unwrap();
    provider
        .register_transient(&ServiceKey::<Top>::of_type(), |s| {
            Ok(Top(s.get::<Left>()?, s.get::<Right>()?))
        })
        .unwrap();

    let root = provider.root_scope().unwrap();
    let request = provider.create_request_scope(&root, "r1", None).unwrap();
    let top = request.get::<Top>().unwrap();
    assert!(Arc::ptr_eq(&top.0 .0, &top.1 .0));
}

#[test]
fn test_same_key_in_different_scopes_is_not_a_cycle() {
    // A request-level service whose factory reads the same identifier from the
    // tenant scope: same key, different scope.
    let key = ServiceKey::<String>::token("Layered");
    let provider = ServiceProvider::new();
    let inner = key.clone();
    provider
        .register_scoped(
            &key,
            move |scope| {
                if scope.level() == ScopeLevel::Tenant {
                    return Ok("tenant".to_string());
                }
                let tenant = scope.ancestor(ScopeLevel::Tenant).unwrap();
                Ok(format!("request over {}", tenant.get_keyed(&inner)?))
            },
            Some(ScopeLevel::Tenant),
        )
        .unwrap();

    let tenant = provider.create_tenant_scope("acme").unwrap();
    let request = provider.create_request_scope(&tenant, "r1", None).unwrap();
    assert_eq!(*request.get_keyed(&key).unwrap(), "request over tenant");
}

#[test]
fn test_depth_limit() {
    let options = ContainerOptions {
        max_resolution_depth: 4,
        ..ContainerOptions::default()
    };
    let provider = ServiceProvider::builder().options(options).build();

    // chain of six distinct services, each depending on the next
    let keys: Vec<ServiceKey<usize>> = (0..6).map(|_| ServiceKey::token("Link")).collect();
    for (i, key) in keys.iter().enumerate() {
        let next = keys.get(i + 1).cloned();
        provider
            .register_transient(key, move |scope| match &next {
                Some(next) => Ok(*scope.get_keyed(next)? + 1),
                None => Ok(0),
            })
            .unwrap();
    }

    assert!(matches!(
        provider.get_keyed(&keys[0]),
        Err(DiError::DepthExceeded(4))
    ));
    // a shorter chain fits
    assert_eq!(*provider.get_keyed(&keys[2]).unwrap(), 3);
}

#[test]
fn test_stack_unwinds_after_failure() {
    let provider = ServiceProvider::new();
    let broken = ServiceKey::<u8>::token("Broken");
    provider
        .register_transient(&broken, |_| Err(DiError::factory("Broken", anyhow::anyhow!("nope"))))
        .unwrap();
    let fine = ServiceKey::<u8>::token("Fine");
    let dep = broken.clone();
    provider
        .register_transient(&fine, move |scope| Ok(scope.try_get_keyed(&dep).map_or(1, |v| *v)))
        .unwrap();

    for _ in 0..3 {
        assert!(provider.get_keyed(&broken).is_err());
        assert_eq!(*provider.get_keyed(&fine).unwrap(), 1);
    }
}
