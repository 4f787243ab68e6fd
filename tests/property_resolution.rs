/// Property-based tests for service resolution
///
/// These tests check that lifetime semantics hold regardless of how many
/// scopes are created and how often services are resolved.
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tiered_di::{DiError, Resolver, ScopeLevel, ServiceKey, ServiceProvider};

#[derive(Debug)]
struct Settings {
    value: String,
}

proptest! {
    #[test]
    fn singleton_is_shared_across_every_scope(
        value in "\\PC{0,32}",
        tenants in prop::collection::vec("[a-z]{1,8}", 1..6),
        requests_per_tenant in 1usize..4,
    ) {
        let provider = ServiceProvider::new();
        let expected = value.clone();
        provider
            .register_singleton(&ServiceKey::<Settings>::of_type(), move |_| {
                Ok(Settings { value: expected.clone() })
            })
            .unwrap();

        let first = provider.get::<Settings>().unwrap();
        prop_assert_eq!(&first.value, &value);

        for tenant_id in &tenants {
            let tenant = provider.create_tenant_scope(tenant_id).unwrap();
            prop_assert!(Arc::ptr_eq(&first, &tenant.get::<Settings>().unwrap()));
            for r in 0..requests_per_tenant {
                let request = provider
                    .create_request_scope(&tenant, &format!("{tenant_id}-{r}"), None)
                    .unwrap();
                prop_assert!(Arc::ptr_eq(&first, &request.get::<Settings>().unwrap()));
            }
        }
    }
}

proptest! {
    #[test]
    fn transient_factory_runs_once_per_resolution(resolutions in 1usize..40) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = ServiceProvider::new();
        provider
            .register_transient(&ServiceKey::<usize>::of_type(), move |_| {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            })
            .unwrap();

        let root = provider.root_scope().unwrap();
        let values: Vec<usize> = (0..resolutions)
            .map(|_| *root.get::<usize>().unwrap())
            .collect();

        prop_assert_eq!(calls.load(Ordering::SeqCst), resolutions);
        prop_assert_eq!(values, (0..resolutions).collect::<Vec<_>>());
        prop_assert_eq!(root.cached_count(), 0);
    }
}

proptest! {
    #[test]
    fn scoped_is_cached_per_scope(scopes in 1usize..10, hits_per_scope in 1usize..6) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = ServiceProvider::new();
        let key = ServiceKey::<usize>::token("per-request");
        provider
            .register_scoped(&key, move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)), None)
            .unwrap();

        let root = provider.root_scope().unwrap();
        let mut seen = Vec::new();
        for i in 0..scopes {
            let request = provider.create_request_scope(&root, &format!("r{i}"), None).unwrap();
            let first = request.get_keyed(&key).unwrap();
            for _ in 1..hits_per_scope {
                prop_assert!(Arc::ptr_eq(&first, &request.get_keyed(&key).unwrap()));
            }
            seen.push(*first);
        }

        prop_assert_eq!(calls.load(Ordering::SeqCst), scopes);
        seen.dedup();
        prop_assert_eq!(seen.len(), scopes);
    }
}

fn level_strategy() -> impl Strategy<Value = ScopeLevel> {
    prop_oneof![
        Just(ScopeLevel::Application),
        Just(ScopeLevel::Tenant),
        Just(ScopeLevel::Request),
    ]
}

proptest! {
    #[test]
    fn minimum_level_is_enforced(minimum in level_strategy(), resolve_at in level_strategy()) {
        let provider = ServiceProvider::new();
        let key = ServiceKey::<u8>::token("gated");
        provider.register_scoped(&key, |_| Ok(1), Some(minimum)).unwrap();

        let root = provider.root_scope().unwrap();
        let tenant = provider.create_tenant_scope("t").unwrap();
        let request = provider.create_request_scope(&tenant, "r", None).unwrap();
        let scope = match resolve_at {
            ScopeLevel::Application => root,
            ScopeLevel::Tenant => tenant,
            ScopeLevel::Request => request,
        };

        let result = scope.get_keyed(&key);
        if resolve_at >= minimum {
            prop_assert!(result.is_ok());
        } else {
            let matched = matches!(
                result,
                Err(DiError::ScopeTooShallow { required, actual, .. })
                    if required == minimum && actual == resolve_at
            );
            prop_assert!(matched);
        }
    }
}

proptest! {
    #[test]
    fn try_get_agrees_with_get(register in any::<bool>()) {
        let provider = ServiceProvider::new();
        if register {
            provider
                .register_instance(&ServiceKey::<Settings>::of_type(), Settings { value: "x".into() })
                .unwrap();
        }

        let root = provider.root_scope().unwrap();
        prop_assert_eq!(root.try_get::<Settings>().is_some(), root.get::<Settings>().is_ok());
        prop_assert_eq!(root.try_get::<Settings>().is_some(), register);
    }
}
