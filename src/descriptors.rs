//! Service descriptors: what to build, how long it lives, how it is torn down.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{Key, ServiceKey};
use crate::lifetime::{Lifetime, ScopeLevel};
use crate::provider::Scope;
use crate::traits::{AnyArc, AsyncDispose, Dispose};

/// Type-erased factory stored on a descriptor.
pub(crate) type ErasedFactory = Arc<dyn Fn(&Scope) -> DiResult<AnyArc> + Send + Sync>;

/// Type-erased synchronous teardown.
pub type SyncTeardown = Arc<dyn Fn(&AnyArc) -> anyhow::Result<()> + Send + Sync>;

/// Future returned by an asynchronous teardown.
pub type TeardownFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Type-erased asynchronous teardown.
pub type AsyncTeardown = Arc<dyn Fn(AnyArc) -> TeardownFuture + Send + Sync>;

/// Teardown capability attached to a cached instance.
///
/// Usually produced by [`DescriptorBuilder::disposable`] or
/// [`DescriptorBuilder::async_disposable`]; build one directly with
/// [`Teardown::of_dispose`] / [`Teardown::of_async_dispose`] when seeding
/// instances through [`Scope::register_scoped_instance_with`].
#[derive(Clone)]
pub enum Teardown {
    Sync(SyncTeardown),
    Async(AsyncTeardown),
}

impl Teardown {
    /// Calls [`Dispose::dispose`] on instances of `T`.
    pub fn of_dispose<T: Dispose>() -> Self {
        Teardown::Sync(Arc::new(|any: &AnyArc| match any.clone().downcast::<T>() {
            Ok(instance) => instance.dispose(),
            Err(_) => Err(anyhow::anyhow!(
                "teardown expected {}",
                std::any::type_name::<T>()
            )),
        }))
    }

    /// Awaits [`AsyncDispose::dispose`] on instances of `T`.
    pub fn of_async_dispose<T: AsyncDispose>() -> Self {
        Teardown::Async(Arc::new(|any: AnyArc| -> TeardownFuture {
            Box::pin(async move {
                match any.downcast::<T>() {
                    Ok(instance) => instance.dispose().await,
                    Err(_) => Err(anyhow::anyhow!(
                        "teardown expected {}",
                        std::any::type_name::<T>()
                    )),
                }
            })
        }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Teardown::Async(_))
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Sync(_) => f.write_str("Teardown::Sync"),
            Teardown::Async(_) => f.write_str("Teardown::Async"),
        }
    }
}

/// Typed, fluent descriptor under construction.
///
/// Nothing is validated until the builder is handed to
/// [`ServiceRegistry::register`](crate::ServiceRegistry::register) (or
/// [`ServiceProvider::register`](crate::ServiceProvider::register)), which
/// rejects a builder without an identifier or factory with
/// [`DiError::MalformedDescriptor`].
///
/// # Examples
///
/// ```rust
/// use tiered_di::{DescriptorBuilder, Dispose, Lifetime, ScopeLevel, ServiceKey, ServiceProvider};
///
/// struct TenantCache;
/// impl Dispose for TenantCache {
///     fn dispose(&self) -> anyhow::Result<()> { Ok(()) }
/// }
///
/// let provider = ServiceProvider::new();
/// provider.register(
///     DescriptorBuilder::new()
///         .key(&ServiceKey::<TenantCache>::of_type())
///         .factory(|_| Ok(TenantCache))
///         .lifetime(Lifetime::Scoped)
///         .minimum_level(ScopeLevel::Tenant)
///         .disposable(),
/// ).unwrap();
///
/// let missing_factory = DescriptorBuilder::<TenantCache>::new()
///     .key(&ServiceKey::of_type())
///     .lifetime(Lifetime::Scoped);
/// assert!(provider.register(missing_factory).is_err());
/// ```
pub struct DescriptorBuilder<T> {
    key: Option<Key>,
    factory: Option<ErasedFactory>,
    instance: Option<AnyArc>,
    lifetime: Lifetime,
    minimum_level: Option<ScopeLevel>,
    teardown: Option<Teardown>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    /// Empty builder with a `Transient` lifetime.
    pub fn new() -> Self {
        Self {
            key: None,
            factory: None,
            instance: None,
            lifetime: Lifetime::Transient,
            minimum_level: None,
            teardown: None,
            _marker: PhantomData,
        }
    }

    pub fn key(mut self, key: &ServiceKey<T>) -> Self {
        self.key = Some(*key.key());
        self
    }

    /// Sets the factory. It receives the resolving scope (the root scope for singletons).
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Scope) -> DiResult<T> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move |scope: &Scope| {
            factory(scope).map(|value| Arc::new(value) as AnyArc)
        }));
        self
    }

    /// Uses a pre-built value. Forces the `Singleton` lifetime; the singleton
    /// cache is seeded at registration and the factory is never invoked.
    pub fn instance(mut self, value: T) -> Self {
        let instance: AnyArc = Arc::new(value);
        let shared = instance.clone();
        self.factory = Some(Arc::new(move |_: &Scope| -> DiResult<AnyArc> {
            Ok(shared.clone())
        }));
        self.instance = Some(instance);
        self.lifetime = Lifetime::Singleton;
        self
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Shallowest scope level the service may be resolved from.
    pub fn minimum_level(mut self, level: ScopeLevel) -> Self {
        self.minimum_level = Some(level);
        self
    }

    pub(crate) fn maybe_minimum_level(mut self, level: Option<ScopeLevel>) -> Self {
        self.minimum_level = level;
        self
    }

    /// Builds the immutable, type-erased descriptor.
    pub fn build(self) -> DiResult<ServiceDescriptor> {
        let key = self
            .key
            .ok_or(DiError::MalformedDescriptor("missing service identifier"))?;
        let factory = self
            .factory
            .ok_or(DiError::MalformedDescriptor("missing factory"))?;
        if self.instance.is_some() && self.lifetime != Lifetime::Singleton {
            return Err(DiError::MalformedDescriptor(
                "pre-built instances must be singletons",
            ));
        }

        Ok(ServiceDescriptor {
            key,
            factory,
            instance: self.instance,
            lifetime: self.lifetime,
            minimum_level: self.minimum_level,
            teardown: self.teardown,
        })
    }
}

impl<T: Dispose> DescriptorBuilder<T> {
    /// Runs [`Dispose::dispose`] when the cached instance is torn down.
    pub fn disposable(mut self) -> Self {
        self.teardown = Some(Teardown::of_dispose::<T>());
        self
    }
}

impl<T: AsyncDispose> DescriptorBuilder<T> {
    /// Awaits [`AsyncDispose::dispose`] when the cached instance is torn down.
    pub fn async_disposable(mut self) -> Self {
        self.teardown = Some(Teardown::of_async_dispose::<T>());
        self
    }
}

impl<T: Send + Sync + 'static> Default for DescriptorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered descriptor: identifier, factory, lifetime and minimum level.
///
/// Immutable once built. Shared by reference across the whole scope tree.
pub struct ServiceDescriptor {
    key: Key,
    factory: ErasedFactory,
    instance: Option<AnyArc>,
    lifetime: Lifetime,
    minimum_level: Option<ScopeLevel>,
    teardown: Option<Teardown>,
}

impl ServiceDescriptor {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Declared minimum level, if any.
    pub fn minimum_level(&self) -> Option<ScopeLevel> {
        self.minimum_level
    }

    /// Minimum level enforced at resolution: the declared one, or `Request`
    /// for scoped services that declared none.
    pub fn effective_minimum_level(&self) -> Option<ScopeLevel> {
        match (self.minimum_level, self.lifetime) {
            (Some(level), _) => Some(level),
            (None, Lifetime::Scoped) => Some(ScopeLevel::Request),
            (None, _) => None,
        }
    }

    pub fn teardown(&self) -> Option<&Teardown> {
        self.teardown.as_ref()
    }

    pub(crate) fn instance(&self) -> Option<&AnyArc> {
        self.instance.as_ref()
    }

    pub(crate) fn create(&self, scope: &Scope) -> DiResult<AnyArc> {
        (self.factory)(scope)
    }

    /// Introspection summary of this descriptor.
    pub fn info(&self) -> DescriptorInfo {
        DescriptorInfo {
            key: self.key,
            lifetime: self.lifetime,
            minimum_level: self.minimum_level,
            has_teardown: self.teardown.is_some(),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("minimum_level", &self.minimum_level)
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

/// Service descriptor summary for introspection and diagnostics
///
/// # Examples
///
/// ```rust
/// use tiered_di::{Lifetime, ServiceKey, ServiceProvider};
///
/// struct Database;
///
/// let provider = ServiceProvider::new();
/// provider.register_singleton(&ServiceKey::<Database>::of_type(), |_| Ok(Database)).unwrap();
/// provider.register_instance(&ServiceKey::<u32>::token("max_connections"), 100u32).unwrap();
///
/// let descriptors = provider.descriptors();
/// assert_eq!(descriptors.len(), 2);
/// assert!(descriptors.iter().all(|d| d.lifetime == Lifetime::Singleton));
/// assert!(descriptors.iter().any(|d| d.key.display_name() == "max_connections"));
/// ```
#[derive(Debug, Clone)]
pub struct DescriptorInfo {
    pub key: Key,
    pub lifetime: Lifetime,
    pub minimum_level: Option<ScopeLevel>,
    pub has_teardown: bool,
}
