//! Resolver traits for service resolution.

use std::any::Any;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{key_of_type, Key, ServiceKey};

/// Type-erased instance as stored in scope and singleton caches.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Core resolver trait for object-safe service resolution.
///
/// Implementors run the full resolution algorithm for `key`: descriptor lookup,
/// minimum-level check, lifetime dispatch, and the resolved notification.
/// Most callers want the typed helpers on [`Resolver`] instead.
pub trait ResolverCore: Send + Sync {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc>;
}

/// Typed resolution helpers built on [`ResolverCore`].
///
/// Implemented by [`Scope`](crate::Scope) and, for resolution against the
/// root scope, by [`ServiceProvider`](crate::ServiceProvider).
///
/// # Examples
///
/// ```
/// use tiered_di::{Resolver, ServiceKey, ServiceProvider};
///
/// let provider = ServiceProvider::new();
/// provider.register_instance(&ServiceKey::<usize>::of_type(), 42usize).unwrap();
///
/// let root = provider.root_scope().unwrap();
/// assert_eq!(*root.get::<usize>().unwrap(), 42);
/// assert!(root.try_get::<String>().is_none());
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves the service registered under the type key of `T`.
    fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = key_of_type::<T>();
        downcast::<T>(self.resolve_any(&key)?)
    }

    /// Resolves the service registered under `key`.
    fn get_keyed<T: Send + Sync + 'static>(&self, key: &ServiceKey<T>) -> DiResult<Arc<T>> {
        downcast::<T>(self.resolve_any(key.key())?)
    }

    /// Non-failing [`get`](Self::get): any resolution error becomes `None`.
    fn try_get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        swallow(self.get::<T>())
    }

    /// Non-failing [`get_keyed`](Self::get_keyed).
    fn try_get_keyed<T: Send + Sync + 'static>(&self, key: &ServiceKey<T>) -> Option<Arc<T>> {
        swallow(self.get_keyed(key))
    }
}

fn downcast<T: Send + Sync + 'static>(any: AnyArc) -> DiResult<Arc<T>> {
    any.downcast::<T>()
        .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
}

fn swallow<T>(result: DiResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(error = %err, "try_get resolved to nothing");
            None
        }
    }
}
