//! Service provider: registration, scope creation and provider-wide teardown.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::config::ContainerOptions;
use crate::descriptors::{DescriptorBuilder, DescriptorInfo, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::internal::{InstanceLog, TrackedInstance};
use crate::key::{Key, ServiceKey};
use crate::lifetime::{Lifetime, ScopeLevel};
use crate::observer::{Observers, ScopeObserver};
use crate::registration::ServiceRegistry;
use crate::traits::{AnyArc, Resolver, ResolverCore};

mod metadata;
mod scope;

pub use metadata::{ScopeId, ScopeMetadata};
pub use scope::Scope;
use scope::InstanceCell;

/// Root container.
///
/// Owns the service registry, the root (Application) scope, the cached tenant
/// scopes and the singleton cache. Cloning is cheap: clones share the same
/// container.
///
/// # Thread Safety
///
/// Every operation takes `&self` and may be called from many tasks at once.
/// First resolution of a singleton, or of a scoped service within one scope,
/// runs its factory exactly once; concurrent callers wait for that result.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiered_di::{Resolver, ScopeLevel, ServiceKey, ServiceProvider};
///
/// struct Logger;
/// struct TenantCache { tenant: String }
/// struct RequestContext { request: String }
///
/// # #[tokio::main]
/// # async fn main() {
/// let provider = ServiceProvider::new();
/// provider.register_singleton(&ServiceKey::<Logger>::of_type(), |_| Ok(Logger)).unwrap();
/// provider.register_scoped(&ServiceKey::<TenantCache>::of_type(), |scope| {
///     Ok(TenantCache { tenant: scope.metadata().tenant_id().unwrap_or_default().to_string() })
/// }, Some(ScopeLevel::Tenant)).unwrap();
/// provider.register_scoped(&ServiceKey::<RequestContext>::of_type(), |scope| {
///     Ok(RequestContext { request: scope.metadata().request_id().unwrap_or_default().to_string() })
/// }, None).unwrap();
///
/// let tenant = provider.create_tenant_scope("acme").unwrap();
/// let r1 = provider.create_request_scope(&tenant, "r1", None).unwrap();
/// let r2 = provider.create_request_scope(&tenant, "r2", None).unwrap();
///
/// assert!(Arc::ptr_eq(&r1.get::<Logger>().unwrap(), &r2.get::<Logger>().unwrap()));
/// assert_eq!(tenant.get::<TenantCache>().unwrap().tenant, "acme");
/// assert_eq!(r2.get::<RequestContext>().unwrap().request, "r2");
///
/// provider.dispose().await;
/// assert!(provider.root_scope().is_err());
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

type TenantCell = Arc<OnceCell<Scope>>;

struct ProviderInner {
    core: Arc<ProviderCore>,
    root: OnceCell<Scope>,
    tenants: Mutex<AHashMap<String, TenantCell>>,
}

/// State shared by the provider and every scope it created.
pub(crate) struct ProviderCore {
    registry: RwLock<ServiceRegistry>,
    singletons: Mutex<AHashMap<Key, InstanceCell>>,
    singleton_log: Mutex<InstanceLog>,
    pub(crate) observers: Observers,
    pub(crate) options: ContainerOptions,
    closed: AtomicBool,
}

impl ProviderCore {
    #[inline]
    pub(crate) fn ensure_open(&self) -> DiResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DiError::ProviderDisposed);
        }
        Ok(())
    }

    pub(crate) fn descriptor(&self, key: &Key) -> Option<Arc<ServiceDescriptor>> {
        self.registry.read().get(key)
    }

    pub(crate) fn singleton_cell(&self, key: &Key) -> InstanceCell {
        self.singletons.lock().entry(*key).or_default().clone()
    }

    /// Hands the entry back if singleton teardown already ran.
    pub(crate) fn track_singleton(&self, entry: TrackedInstance) -> Result<(), TrackedInstance> {
        self.singleton_log.lock().push(entry)
    }

    pub(crate) fn evict_singleton(&self, key: &Key, cell: &InstanceCell) {
        let mut singletons = self.singletons.lock();
        if singletons.get(key).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            singletons.remove(key);
        }
    }

    /// Releases an instance whose factory returned after its owner was
    /// disposed. The caller gets an error instead of the instance.
    pub(crate) fn release_late(&self, entry: TrackedInstance, scope: &Scope) {
        tracing::warn!(service = %entry.key, scope = %scope.id(), "instance built after disposal; releasing it");
        if let Err(err) = entry.teardown_late() {
            self.report_disposal_error(&entry.key, &err, scope);
        }
    }

    pub(crate) fn report_disposal_error(&self, key: &Key, error: &anyhow::Error, scope: &Scope) {
        tracing::error!(service = %key, scope = %scope.id(), error = %error, "disposal failed");
        self.observers.disposal_error(key, error, scope);
    }

    /// Makes a freshly registered descriptor visible to the singleton cache.
    fn install(&self, descriptor: &ServiceDescriptor) -> DiResult<()> {
        let key = *descriptor.key();
        let mut singletons = self.singletons.lock();
        singletons.remove(&key);

        let Some(instance) = descriptor.instance() else {
            return Ok(());
        };
        let rejected = self
            .singleton_log
            .lock()
            .push(TrackedInstance {
                key,
                instance: instance.clone(),
                teardown: descriptor.teardown().cloned(),
            })
            .err();
        if let Some(late) = rejected {
            drop(singletons);
            if let Err(err) = late.teardown_late() {
                tracing::error!(service = %key, error = %err, "disposal failed");
            }
            return Err(DiError::ProviderDisposed);
        }
        singletons.insert(key, Arc::new(OnceCell::with_value(instance.clone())));
        Ok(())
    }
}

impl Drop for ProviderCore {
    fn drop(&mut self) {
        if *self.closed.get_mut() || !self.options.warn_on_undisposed_drop {
            return;
        }
        let pending = self.singleton_log.get_mut().pending_teardowns();
        if pending > 0 {
            tracing::warn!(
                pending,
                "service provider dropped with undisposed singletons; call dispose().await before dropping"
            );
        }
    }
}

/// Builder for [`ServiceProvider`]: options and observers.
///
/// ```
/// use std::sync::Arc;
/// use tiered_di::{ContainerOptions, ServiceProvider, TracingObserver};
///
/// let provider = ServiceProvider::builder()
///     .options(ContainerOptions::from_env())
///     .observer(Arc::new(TracingObserver::new()))
///     .build();
/// assert!(!provider.is_disposed());
/// ```
#[derive(Default)]
pub struct ServiceProviderBuilder {
    options: ContainerOptions,
    observers: Observers,
}

impl ServiceProviderBuilder {
    pub fn options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds an observer. Observers are notified in the order they were added.
    pub fn observer(mut self, observer: Arc<dyn ScopeObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            inner: Arc::new(ProviderInner {
                core: Arc::new(ProviderCore {
                    registry: RwLock::new(ServiceRegistry::new()),
                    singletons: Mutex::new(AHashMap::new()),
                    singleton_log: Mutex::new(InstanceLog::default()),
                    observers: self.observers,
                    options: self.options,
                    closed: AtomicBool::new(false),
                }),
                root: OnceCell::new(),
                tenants: Mutex::new(AHashMap::new()),
            }),
        }
    }
}

impl ServiceProvider {
    /// Provider with default options and no observers.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ServiceProviderBuilder {
        ServiceProviderBuilder::default()
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.core.options
    }

    #[inline]
    fn core(&self) -> &Arc<ProviderCore> {
        &self.inner.core
    }

    /// True once `dispose()` has started.
    pub fn is_disposed(&self) -> bool {
        self.core().ensure_open().is_err()
    }

    /// Registers a descriptor built with [`DescriptorBuilder`].
    ///
    /// Fails with [`DiError::MalformedDescriptor`] if the identifier or factory
    /// is missing. A second registration for the same identifier replaces the
    /// first; a singleton already created under the old descriptor stays alive
    /// until provider teardown but is no longer returned.
    pub fn register<T: Send + Sync + 'static>(&self, builder: DescriptorBuilder<T>) -> DiResult<()> {
        let core = self.core();
        core.ensure_open()?;
        let descriptor = core.registry.write().register(builder)?;
        core.install(&descriptor)?;
        tracing::debug!(
            service = %descriptor.key(),
            lifetime = %descriptor.lifetime(),
            "service registered"
        );
        Ok(())
    }

    /// One instance for the provider's lifetime, created on first resolution.
    ///
    /// The factory always receives the root scope, whichever scope resolved
    /// the service.
    pub fn register_singleton<T, F>(&self, key: &ServiceKey<T>, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register(
            DescriptorBuilder::new()
                .key(key)
                .factory(factory)
                .lifetime(Lifetime::Singleton),
        )
    }

    /// One instance per scope, cached on the scope that resolves it first.
    ///
    /// `minimum_level` defaults to [`ScopeLevel::Request`]; resolving from a
    /// shallower scope fails with [`DiError::ScopeTooShallow`].
    ///
    /// # Caching with a `Tenant` minimum
    ///
    /// The minimum is only a permission check. The instance is always cached
    /// on the scope the resolution was made from. A service registered with
    /// `Some(ScopeLevel::Tenant)` and first resolved from a *request* scope is
    /// cached on that request scope, so sibling requests each build their own
    /// copy. To share one instance across a tenant's requests, resolve it
    /// from the tenant scope itself, e.g. through
    /// [`Scope::ancestor`]`(ScopeLevel::Tenant)`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tiered_di::{Resolver, ScopeLevel, ServiceKey, ServiceProvider};
    ///
    /// struct TenantCache;
    ///
    /// let provider = ServiceProvider::new();
    /// provider.register_scoped(
    ///     &ServiceKey::<TenantCache>::of_type(),
    ///     |_| Ok(TenantCache),
    ///     Some(ScopeLevel::Tenant),
    /// ).unwrap();
    ///
    /// let tenant = provider.create_tenant_scope("acme").unwrap();
    /// let r1 = provider.create_request_scope(&tenant, "r1", None).unwrap();
    /// let r2 = provider.create_request_scope(&tenant, "r2", None).unwrap();
    ///
    /// // Cached per request when resolved from the request scopes...
    /// assert!(!Arc::ptr_eq(&r1.get::<TenantCache>().unwrap(), &r2.get::<TenantCache>().unwrap()));
    ///
    /// // ...and shared when resolved against the tenant scope.
    /// let shared1 = r1.ancestor(ScopeLevel::Tenant).unwrap().get::<TenantCache>().unwrap();
    /// let shared2 = r2.ancestor(ScopeLevel::Tenant).unwrap().get::<TenantCache>().unwrap();
    /// assert!(Arc::ptr_eq(&shared1, &shared2));
    /// ```
    pub fn register_scoped<T, F>(
        &self,
        key: &ServiceKey<T>,
        factory: F,
        minimum_level: Option<ScopeLevel>,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register(
            DescriptorBuilder::new()
                .key(key)
                .factory(factory)
                .lifetime(Lifetime::Scoped)
                .maybe_minimum_level(minimum_level),
        )
    }

    /// A new instance on every resolution; never cached, never torn down.
    pub fn register_transient<T, F>(&self, key: &ServiceKey<T>, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register(
            DescriptorBuilder::new()
                .key(key)
                .factory(factory)
                .lifetime(Lifetime::Transient),
        )
    }

    /// Registers a pre-built singleton. The singleton cache is seeded
    /// immediately and no factory ever runs.
    pub fn register_instance<T: Send + Sync + 'static>(
        &self,
        key: &ServiceKey<T>,
        value: T,
    ) -> DiResult<()> {
        self.register(DescriptorBuilder::new().key(key).instance(value))
    }

    pub fn is_registered(&self, key: &Key) -> bool {
        self.core().registry.read().has(key)
    }

    /// Registered descriptors in first-registration order.
    pub fn descriptors(&self) -> Vec<DescriptorInfo> {
        self.core().registry.read().descriptors()
    }

    /// The Application scope, created on first call.
    pub fn root_scope(&self) -> DiResult<Scope> {
        let core = self.core();
        core.ensure_open()?;

        let mut created = false;
        let root = self
            .inner
            .root
            .get_or_init(|| {
                created = true;
                Scope::new_root(core.clone())
            })
            .clone();

        if created {
            tracing::debug!(scope = %root.id(), "root scope created");
            core.observers.scope_created(&root);
        }
        Ok(root)
    }

    /// Returns the cached tenant scope for `tenant_id`, creating it under the
    /// root scope on first use.
    ///
    /// Concurrent first calls for one tenant create a single scope. The tenant
    /// map is not locked while the scope is built, so observers may call back
    /// into the provider from [`ScopeObserver::on_scope_created`].
    pub fn create_tenant_scope(&self, tenant_id: &str) -> DiResult<Scope> {
        let root = self.root_scope()?;

        let cell = {
            let mut tenants = self.inner.tenants.lock();
            let cell = tenants.entry(tenant_id.to_string()).or_default();
            if cell.get().is_some_and(Scope::is_disposed) {
                *cell = TenantCell::default();
            }
            cell.clone()
        };

        let tenant = cell.get_or_try_init(|| {
            root.create_child_scope(
                ScopeLevel::Tenant,
                ScopeMetadata::new().with_tenant(tenant_id),
            )
        })?;
        Ok(tenant.clone())
    }

    /// Creates a request scope under an Application or Tenant scope owned by
    /// this provider.
    pub fn create_request_scope(
        &self,
        parent: &Scope,
        request_id: &str,
        user_id: Option<&str>,
    ) -> DiResult<Scope> {
        let core = self.core();
        core.ensure_open()?;
        if !Arc::ptr_eq(parent.core(), core) {
            return Err(DiError::ForeignScope(parent.id()));
        }
        if !matches!(parent.level(), ScopeLevel::Application | ScopeLevel::Tenant) {
            return Err(DiError::BadScopeHierarchy {
                parent: parent.level(),
                child: ScopeLevel::Request,
            });
        }

        let mut metadata = ScopeMetadata::new().with_request(request_id);
        if let Some(user_id) = user_id {
            metadata = metadata.with_user(user_id);
        }
        parent.create_child_scope(ScopeLevel::Request, metadata)
    }

    /// Disposes and evicts one cached tenant scope. Returns `Ok(false)` if no
    /// tenant scope was cached under `tenant_id`, and
    /// [`DiError::ProviderDisposed`] once the provider itself was disposed.
    pub async fn dispose_tenant_scope(&self, tenant_id: &str) -> DiResult<bool> {
        self.core().ensure_open()?;
        let evicted = self.inner.tenants.lock().remove(tenant_id);
        match evicted.as_ref().and_then(|cell| cell.get()) {
            Some(tenant) => {
                tenant.dispose().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of tenant scopes currently cached.
    pub fn tenant_count(&self) -> usize {
        self.inner
            .tenants
            .lock()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    /// Runs `f` inside a fresh request scope and disposes the scope afterwards,
    /// whether `f` succeeded or not.
    ///
    /// ```
    /// use tiered_di::{DiError, Resolver, ServiceKey, ServiceProvider};
    ///
    /// struct RequestId(String);
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), DiError> {
    /// let provider = ServiceProvider::new();
    /// provider.register_scoped(&ServiceKey::<RequestId>::of_type(), |scope| {
    ///     Ok(RequestId(scope.metadata().request_id().unwrap_or_default().to_string()))
    /// }, None)?;
    ///
    /// let root = provider.root_scope()?;
    /// let id = provider
    ///     .run_in_request_scope(&root, "req-42", None, |scope| async move {
    ///         Ok::<_, DiError>(scope.get::<RequestId>()?.0.clone())
    ///     })
    ///     .await?;
    ///
    /// assert_eq!(id, "req-42");
    /// assert_eq!(root.children_count(), 0);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_in_request_scope<F, Fut, R, E>(
        &self,
        parent: &Scope,
        request_id: &str,
        user_id: Option<&str>,
        f: F,
    ) -> Result<R, E>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DiError>,
    {
        let scope = self.create_request_scope(parent, request_id, user_id)?;
        let result = f(scope.clone()).await;
        scope.dispose().await;
        result
    }

    /// Tears the whole container down.
    ///
    /// Marks the provider closed, disposes every cached tenant scope, then the
    /// root scope (cascading into any remaining children), then singleton
    /// instances in reverse creation order. Later calls are no-ops; every
    /// registration, resolution or scope creation afterwards fails with
    /// [`DiError::ProviderDisposed`], including a singleton resolution whose
    /// factory returns after teardown; its instance is released on the spot.
    pub async fn dispose(&self) {
        let core = self.core();
        if core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("disposing service provider");

        let tenants: Vec<Scope> = self
            .inner
            .tenants
            .lock()
            .drain()
            .filter_map(|(_, cell)| cell.get().cloned())
            .collect();
        for tenant in tenants {
            tenant.dispose().await;
        }

        let root = match self.inner.root.get() {
            Some(root) => {
                root.dispose().await;
                root.clone()
            }
            None => {
                let detached = Scope::new_root(core.clone());
                detached.mark_disposed();
                detached
            }
        };

        // tenants created after the drain went down with the root
        self.inner.tenants.lock().clear();

        loop {
            let entries = core.singleton_log.lock().drain_or_seal();
            if entries.is_empty() {
                break;
            }
            for entry in entries {
                if let Err(err) = entry.teardown().await {
                    core.report_disposal_error(&entry.key, &err, &root);
                }
            }
        }
        core.singletons.lock().clear();
        tracing::debug!("service provider disposed");
    }
}

impl Default for ServiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverCore for ServiceProvider {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.root_scope()?.resolve_any(key)
    }
}

impl Resolver for ServiceProvider {}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.core().registry.read().len())
            .field("tenants", &self.tenant_count())
            .field("observers", &self.core().observers.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
