//! Observer hooks for scope lifecycle and resolution events.

use std::sync::Arc;

use crate::key::Key;
use crate::provider::Scope;

/// Observer trait for container lifecycle events.
///
/// Every method has a no-op default, so implementors only override what they
/// need. Calls are made synchronously on the thread performing the operation,
/// in observer registration order; keep implementations lightweight.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use tiered_di::{Key, Resolver, Scope, ScopeObserver, ServiceKey, ServiceProvider};
///
/// #[derive(Default)]
/// struct CountingObserver {
///     resolved: AtomicUsize,
/// }
///
/// impl ScopeObserver for CountingObserver {
///     fn on_service_resolved(&self, _key: &Key, _scope: &Scope) {
///         self.resolved.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let observer = Arc::new(CountingObserver::default());
/// let provider = ServiceProvider::builder().observer(observer.clone()).build();
/// provider.register_instance(&ServiceKey::<u8>::of_type(), 7u8).unwrap();
///
/// let root = provider.root_scope().unwrap();
/// root.get::<u8>().unwrap();
/// root.get::<u8>().unwrap();
/// assert_eq!(observer.resolved.load(Ordering::SeqCst), 2);
/// ```
pub trait ScopeObserver: Send + Sync {
    /// Called after a scope is created and attached to its parent.
    fn on_scope_created(&self, _scope: &Scope) {}

    /// Called when disposal of a scope begins, before any child is touched.
    fn on_scope_disposing(&self, _scope: &Scope) {}

    /// Called once a scope is fully disposed and detached.
    fn on_scope_disposed(&self, _scope: &Scope) {}

    /// Called on every successful resolution, with the scope it was requested from.
    fn on_service_resolved(&self, _key: &Key, _scope: &Scope) {}

    /// Called exactly once per failed teardown. Disposal continues afterwards.
    fn on_disposal_error(&self, _key: &Key, _error: &anyhow::Error, _scope: &Scope) {}
}

#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ScopeObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ScopeObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn scope_created(&self, scope: &Scope) {
        for observer in &self.observers {
            observer.on_scope_created(scope);
        }
    }

    #[inline]
    pub(crate) fn scope_disposing(&self, scope: &Scope) {
        for observer in &self.observers {
            observer.on_scope_disposing(scope);
        }
    }

    #[inline]
    pub(crate) fn scope_disposed(&self, scope: &Scope) {
        for observer in &self.observers {
            observer.on_scope_disposed(scope);
        }
    }

    #[inline]
    pub(crate) fn service_resolved(&self, key: &Key, scope: &Scope) {
        for observer in &self.observers {
            observer.on_service_resolved(key, scope);
        }
    }

    pub(crate) fn disposal_error(&self, key: &Key, error: &anyhow::Error, scope: &Scope) {
        for observer in &self.observers {
            observer.on_disposal_error(key, error, scope);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }
}

/// Forwards every hook to `tracing` at `info` level (errors at `error`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ScopeObserver for TracingObserver {
    fn on_scope_created(&self, scope: &Scope) {
        tracing::info!(scope = %scope.id(), level = %scope.level(), "scope created");
    }

    fn on_scope_disposing(&self, scope: &Scope) {
        tracing::info!(scope = %scope.id(), level = %scope.level(), "scope disposing");
    }

    fn on_scope_disposed(&self, scope: &Scope) {
        tracing::info!(scope = %scope.id(), level = %scope.level(), "scope disposed");
    }

    fn on_service_resolved(&self, key: &Key, scope: &Scope) {
        tracing::info!(service = %key, scope = %scope.id(), level = %scope.level(), "service resolved");
    }

    fn on_disposal_error(&self, key: &Key, error: &anyhow::Error, scope: &Scope) {
        tracing::error!(service = %key, scope = %scope.id(), error = %error, "disposal failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DescriptorBuilder, Dispose, Lifetime, Resolver, ServiceKey, ServiceProvider};
    use tracing_test::traced_test;

    struct Leaky;

    impl Dispose for Leaky {
        fn dispose(&self) -> anyhow::Result<()> {
            anyhow::bail!("socket already closed")
        }
    }

    #[test]
    #[traced_test]
    fn test_tracing_observer_logs_lifecycle() {
        let provider = ServiceProvider::builder()
            .observer(Arc::new(TracingObserver::new()))
            .build();
        let answer = ServiceKey::<u8>::token("answer");
        provider.register_instance(&answer, 42).unwrap();

        let tenant = provider.create_tenant_scope("acme").unwrap();
        tenant.get_keyed(&answer).unwrap();

        assert!(logs_contain("scope created"));
        assert!(logs_contain("level=tenant"));
        assert!(logs_contain("service resolved"));
        assert!(logs_contain("service=answer"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_tracing_observer_logs_disposal_errors() {
        let provider = ServiceProvider::builder()
            .observer(Arc::new(TracingObserver))
            .build();
        provider
            .register(
                DescriptorBuilder::new()
                    .key(&ServiceKey::<Leaky>::of_type())
                    .factory(|_| Ok(Leaky))
                    .lifetime(Lifetime::Scoped)
                    .disposable(),
            )
            .unwrap();

        let root = provider.root_scope().unwrap();
        let request = provider.create_request_scope(&root, "r1", None).unwrap();
        request.get::<Leaky>().unwrap();
        request.dispose().await;

        assert!(logs_contain("scope disposing"));
        assert!(logs_contain("disposal failed"));
        assert!(logs_contain("socket already closed"));
        assert!(logs_contain("scope disposed"));
    }

    #[test]
    fn test_fan_out_counts_observers() {
        let mut observers = Observers::default();
        assert_eq!(observers.len(), 0);
        observers.add(Arc::new(TracingObserver));
        observers.add(Arc::new(TracingObserver));
        assert_eq!(observers.len(), 2);
    }
}
