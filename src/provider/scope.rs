//! Scope: one node of the Application → Tenant → Request tree.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::Instrument;

use super::metadata::{ScopeId, ScopeMetadata};
use super::ProviderCore;
use crate::descriptors::{ServiceDescriptor, Teardown};
use crate::error::{DiError, DiResult};
use crate::internal::{InstanceLog, StackGuard, TrackedInstance};
use crate::key::{Key, ServiceKey};
use crate::lifetime::{Lifetime, ScopeLevel};
use crate::traits::{AnyArc, Resolver, ResolverCore};

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

pub(crate) type InstanceCell = Arc<OnceCell<AnyArc>>;

/// A node in the scope tree that owns cached instances and child scopes.
///
/// `Scope` is a cheap handle: clones refer to the same node. Scoped services
/// are cached on the scope that first resolves them, singletons are delegated
/// to the provider-wide cache, and transients are built on every call.
///
/// A child keeps its parent alive; a parent only tracks its children weakly
/// and disposes every child still alive when it is itself disposed.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiered_di::{Resolver, ServiceKey, ServiceProvider};
///
/// struct DatabaseConnection(String);
/// struct UserService {
///     db: Arc<DatabaseConnection>,
/// }
///
/// let provider = ServiceProvider::new();
/// provider.register_scoped(&ServiceKey::<DatabaseConnection>::of_type(), |scope| {
///     Ok(DatabaseConnection(format!("conn-{}", scope.id())))
/// }, None).unwrap();
/// provider.register_transient(&ServiceKey::<UserService>::of_type(), |scope| {
///     Ok(UserService { db: scope.get::<DatabaseConnection>()? })
/// }).unwrap();
///
/// let root = provider.root_scope().unwrap();
/// let request = provider.create_request_scope(&root, "req-1", Some("alice")).unwrap();
///
/// // Multiple services in the same scope share the same DB connection
/// let user1 = request.get::<UserService>().unwrap();
/// let user2 = request.get::<UserService>().unwrap();
/// assert!(Arc::ptr_eq(&user1.db, &user2.db));
/// assert_eq!(request.metadata().user_id(), Some("alice"));
/// ```
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    id: ScopeId,
    level: ScopeLevel,
    parent: Option<Scope>,
    metadata: ScopeMetadata,
    core: Arc<ProviderCore>,
    cache: Mutex<AHashMap<Key, InstanceCell>>,
    pub(crate) instances: Mutex<InstanceLog>,
    children: Mutex<Vec<(ScopeId, Weak<ScopeInner>)>>,
    state: AtomicU8,
}

impl Scope {
    fn new(
        core: Arc<ProviderCore>,
        level: ScopeLevel,
        parent: Option<Scope>,
        metadata: ScopeMetadata,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::new(),
                level,
                parent,
                metadata,
                core,
                cache: Mutex::new(AHashMap::new()),
                instances: Mutex::new(InstanceLog::default()),
                children: Mutex::new(Vec::new()),
                state: AtomicU8::new(ACTIVE),
            }),
        }
    }

    pub(crate) fn new_root(core: Arc<ProviderCore>) -> Self {
        Self::new(core, ScopeLevel::Application, None, ScopeMetadata::default())
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    #[inline]
    pub fn level(&self) -> ScopeLevel {
        self.inner.level
    }

    /// Parent scope; `None` only for the root (Application) scope.
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Metadata inherited from the parent and overlaid with this scope's values.
    pub fn metadata(&self) -> &ScopeMetadata {
        &self.inner.metadata
    }

    /// True once `dispose()` has started.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != ACTIVE
    }

    /// Number of child scopes that are still alive.
    pub fn children_count(&self) -> usize {
        self.inner
            .children
            .lock()
            .iter()
            .filter(|(_, child)| child.strong_count() > 0)
            .count()
    }

    /// Number of instances cached on this scope.
    pub fn cached_count(&self) -> usize {
        self.inner.instances.lock().len()
    }

    /// Nearest scope at `level`, starting with this one and walking up.
    ///
    /// Use it to resolve tenant-wide scoped services against the tenant scope
    /// from inside a request.
    pub fn ancestor(&self, level: ScopeLevel) -> Option<Scope> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.level() == level {
                return Some(scope.clone());
            }
            current = scope.parent();
        }
        None
    }

    /// Same node, compared by identity.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline]
    pub(crate) fn core(&self) -> &Arc<ProviderCore> {
        &self.inner.core
    }

    pub(crate) fn live_children(&self) -> Vec<Scope> {
        self.inner
            .children
            .lock()
            .iter()
            .filter_map(|(_, child)| child.upgrade())
            .map(|inner| Scope { inner })
            .collect()
    }

    fn root(&self) -> &Scope {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    fn ensure_usable(&self) -> DiResult<()> {
        self.core().ensure_open()?;
        if self.is_disposed() {
            return Err(DiError::ScopeDisposed(self.id()));
        }
        Ok(())
    }

    /// Creates a child scope at `level`, which must be strictly deeper than this one.
    ///
    /// The child's metadata is this scope's metadata overlaid with `overrides`.
    ///
    /// ```
    /// use tiered_di::{DiError, ScopeLevel, ScopeMetadata, ServiceProvider};
    ///
    /// let provider = ServiceProvider::new();
    /// let root = provider.root_scope().unwrap();
    /// let tenant = root
    ///     .create_child_scope(ScopeLevel::Tenant, ScopeMetadata::new().with_tenant("acme"))
    ///     .unwrap();
    ///
    /// assert!(matches!(
    ///     tenant.create_child_scope(ScopeLevel::Tenant, ScopeMetadata::new()),
    ///     Err(DiError::BadScopeHierarchy { .. })
    /// ));
    /// ```
    pub fn create_child_scope(
        &self,
        level: ScopeLevel,
        overrides: ScopeMetadata,
    ) -> DiResult<Scope> {
        self.core().ensure_open()?;
        if !self.level().admits_child(level) {
            return Err(DiError::BadScopeHierarchy {
                parent: self.level(),
                child: level,
            });
        }

        let child = Scope::new(
            self.core().clone(),
            level,
            Some(self.clone()),
            self.metadata().overlay(&overrides),
        );

        {
            // state is re-checked under the children lock so a concurrent
            // dispose() either sees the child or rejects it
            let mut children = self.inner.children.lock();
            if self.is_disposed() {
                return Err(DiError::ScopeDisposed(self.id()));
            }
            children.retain(|(_, existing)| existing.strong_count() > 0);
            children.push((child.id(), Arc::downgrade(&child.inner)));
        }

        tracing::debug!(scope = %child.id(), level = %level, parent = %self.id(), "scope created");
        self.core().observers.scope_created(&child);
        Ok(child)
    }

    /// Caches a pre-built instance on this scope without running any factory.
    ///
    /// Seeded instances are visible to resolutions performed against this
    /// scope, even when the identifier has no registered descriptor. They are
    /// not visible to child scopes.
    ///
    /// ```
    /// use tiered_di::{Resolver, ServiceKey, ServiceProvider};
    ///
    /// struct RequestContext { path: String }
    ///
    /// let provider = ServiceProvider::new();
    /// let root = provider.root_scope().unwrap();
    /// let request = provider.create_request_scope(&root, "req-1", None).unwrap();
    ///
    /// let key = ServiceKey::<RequestContext>::of_type();
    /// request.register_scoped_instance(&key, RequestContext { path: "/orders".into() }).unwrap();
    /// assert_eq!(request.get::<RequestContext>().unwrap().path, "/orders");
    /// assert!(root.try_get::<RequestContext>().is_none());
    /// ```
    pub fn register_scoped_instance<T: Send + Sync + 'static>(
        &self,
        key: &ServiceKey<T>,
        value: T,
    ) -> DiResult<Arc<T>> {
        self.seed(key, value, None)
    }

    /// [`register_scoped_instance`](Self::register_scoped_instance) with a
    /// teardown that runs when this scope is disposed.
    pub fn register_scoped_instance_with<T: Send + Sync + 'static>(
        &self,
        key: &ServiceKey<T>,
        value: T,
        teardown: Teardown,
    ) -> DiResult<Arc<T>> {
        self.seed(key, value, Some(teardown))
    }

    fn seed<T: Send + Sync + 'static>(
        &self,
        key: &ServiceKey<T>,
        value: T,
        teardown: Option<Teardown>,
    ) -> DiResult<Arc<T>> {
        self.ensure_usable()?;
        let typed = Arc::new(value);
        let instance: AnyArc = typed.clone();
        let key = *key.key();
        let entry = TrackedInstance {
            key,
            instance: instance.clone(),
            teardown,
        };

        // cache insert stays under the instances lock so disposal cannot
        // clear the cache between the two
        let mut instances = self.inner.instances.lock();
        if let Err(late) = instances.push(entry) {
            drop(instances);
            self.core().release_late(late, self);
            return Err(DiError::ScopeDisposed(self.id()));
        }
        self.inner
            .cache
            .lock()
            .insert(key, Arc::new(OnceCell::with_value(instance)));
        Ok(typed)
    }

    fn cached(&self, key: &Key) -> Option<AnyArc> {
        self.inner
            .cache
            .lock()
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    fn resolve_singleton(&self, descriptor: &ServiceDescriptor) -> DiResult<AnyArc> {
        let core = self.core();
        let key = *descriptor.key();
        let cell = core.singleton_cell(&key);
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }

        let root = self.root();
        let _guard = StackGuard::enter(root.id(), key, core.options.max_resolution_depth)?;
        let mut created = false;
        let value = cell
            .get_or_try_init(|| {
                created = true;
                descriptor
                    .create(root)
                    .map_err(|err| err.attributed_to(key.display_name()))
            })?
            .clone();

        if created {
            tracing::debug!(service = %key, "singleton created");
            let rejected = core
                .track_singleton(TrackedInstance {
                    key,
                    instance: value.clone(),
                    teardown: descriptor.teardown().cloned(),
                })
                .err();
            if let Some(late) = rejected {
                core.evict_singleton(&key, &cell);
                core.release_late(late, root);
                return Err(DiError::ProviderDisposed);
            }
        }
        Ok(value)
    }

    fn resolve_scoped(&self, descriptor: &ServiceDescriptor) -> DiResult<AnyArc> {
        let key = *descriptor.key();
        let cell = self.inner.cache.lock().entry(key).or_default().clone();
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }

        let _guard = StackGuard::enter(self.id(), key, self.core().options.max_resolution_depth)?;
        let mut created = false;
        let value = cell
            .get_or_try_init(|| {
                created = true;
                descriptor
                    .create(self)
                    .map_err(|err| err.attributed_to(key.display_name()))
            })?
            .clone();

        if created {
            tracing::debug!(service = %key, scope = %self.id(), level = %self.level(), "scoped instance created");
            let rejected = self
                .inner
                .instances
                .lock()
                .push(TrackedInstance {
                    key,
                    instance: value.clone(),
                    teardown: descriptor.teardown().cloned(),
                })
                .err();
            if let Some(late) = rejected {
                self.evict(&key, &cell);
                self.core().release_late(late, self);
                return Err(DiError::ScopeDisposed(self.id()));
            }
        }
        Ok(value)
    }

    fn evict(&self, key: &Key, cell: &InstanceCell) {
        let mut cache = self.inner.cache.lock();
        if cache.get(key).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            cache.remove(key);
        }
    }

    fn resolve_transient(&self, descriptor: &ServiceDescriptor) -> DiResult<AnyArc> {
        let key = *descriptor.key();
        let _guard = StackGuard::enter(self.id(), key, self.core().options.max_resolution_depth)?;
        descriptor
            .create(self)
            .map_err(|err| err.attributed_to(key.display_name()))
    }

    fn resolve_any_impl(&self, key: &Key) -> DiResult<AnyArc> {
        self.ensure_usable()?;

        let Some(descriptor) = self.core().descriptor(key) else {
            return self
                .cached(key)
                .ok_or(DiError::NotRegistered(key.display_name()));
        };

        if let Some(required) = descriptor.effective_minimum_level() {
            if self.level() < required {
                return Err(DiError::ScopeTooShallow {
                    service: key.display_name(),
                    required,
                    actual: self.level(),
                });
            }
        }

        match descriptor.lifetime() {
            Lifetime::Singleton => self.resolve_singleton(&descriptor),
            Lifetime::Scoped => self.resolve_scoped(&descriptor),
            Lifetime::Transient => self.resolve_transient(&descriptor),
        }
    }

    /// Disposes this scope and, first, every live child scope.
    ///
    /// Order: children (newest first, depth-first), then this scope's cached
    /// instances in reverse creation order, then detachment from the parent.
    /// Teardown failures are reported through
    /// [`ScopeObserver::on_disposal_error`](crate::ScopeObserver::on_disposal_error)
    /// and do not stop the cascade. A second call is a no-op; any other use of
    /// the scope afterwards fails with [`DiError::ScopeDisposed`].
    ///
    /// A factory still running when disposal finishes does not leak its
    /// instance: the instance is torn down on the resolving thread and that
    /// resolution fails with [`DiError::ScopeDisposed`]. Async teardown cannot
    /// run there and is reported through `on_disposal_error` instead.
    ///
    /// ```
    /// use tiered_di::{DiError, Resolver, ServiceKey, ServiceProvider};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let provider = ServiceProvider::new();
    /// provider.register_scoped(&ServiceKey::<String>::of_type(), |_| Ok("state".to_string()), None).unwrap();
    ///
    /// let root = provider.root_scope().unwrap();
    /// let request = provider.create_request_scope(&root, "req-1", None).unwrap();
    /// request.get::<String>().unwrap();
    ///
    /// request.dispose().await;
    /// request.dispose().await; // no-op
    /// assert!(matches!(request.get::<String>(), Err(DiError::ScopeDisposed(_))));
    /// assert!(!root.is_disposed());
    /// # }
    /// ```
    pub async fn dispose(&self) {
        self.dispose_boxed().await
    }

    fn dispose_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let span = tracing::debug_span!("dispose", scope = %self.id(), level = %self.level());
        Box::pin(
            async move {
                if self
                    .inner
                    .state
                    .compare_exchange(ACTIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }

                let core = self.core().clone();
                tracing::debug!("disposing scope");
                core.observers.scope_disposing(self);

                let mut children = self.live_children();
                children.reverse();
                for child in children {
                    child.dispose_boxed().await;
                }

                // factories still running when the cascade started may add
                // entries while we tear down; drain until the log seals
                loop {
                    let entries = self.inner.instances.lock().drain_or_seal();
                    if entries.is_empty() {
                        break;
                    }
                    for entry in entries {
                        if let Err(err) = entry.teardown().await {
                            core.report_disposal_error(&entry.key, &err, self);
                        }
                    }
                }
                self.inner.cache.lock().clear();

                if let Some(parent) = self.parent() {
                    parent.detach_child(self.id());
                }

                self.inner.state.store(DISPOSED, Ordering::Release);
                tracing::debug!("scope disposed");
                core.observers.scope_disposed(self);
            }
            .instrument(span),
        )
    }

    fn detach_child(&self, id: ScopeId) {
        self.inner.children.lock().retain(|(child, _)| *child != id);
    }

    /// Marks a scope terminal without running the cascade.
    pub(crate) fn mark_disposed(&self) {
        self.inner.state.store(DISPOSED, Ordering::Release);
    }
}

impl ResolverCore for Scope {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        let _span = tracing::trace_span!("resolve", service = %key, scope = %self.id(), level = %self.level()).entered();
        let instance = self.resolve_any_impl(key)?;

        if self.core().options.trace_resolutions {
            tracing::trace!(service = %key, scope = %self.id(), level = %self.level(), "service resolved");
        }
        self.core().observers.service_resolved(key, self);
        Ok(instance)
    }
}

impl Resolver for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id())
            .field("level", &self.level())
            .field("parent", &self.parent().map(Scope::id))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if *self.state.get_mut() == DISPOSED || !self.core.options.warn_on_undisposed_drop {
            return;
        }
        let pending = self.instances.get_mut().pending_teardowns();
        if pending > 0 {
            tracing::warn!(
                scope = %self.id,
                level = %self.level,
                pending,
                "scope dropped with undisposed resources; call dispose().await before dropping"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerOptions, DescriptorBuilder, Dispose, ServiceProvider};
    use tracing_test::traced_test;

    struct Handle;

    impl Dispose for Handle {
        fn dispose(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn provider_with_handle(options: ContainerOptions) -> ServiceProvider {
        let provider = ServiceProvider::builder().options(options).build();
        provider
            .register(
                DescriptorBuilder::new()
                    .key(&ServiceKey::<Handle>::of_type())
                    .factory(|_| Ok(Handle))
                    .lifetime(Lifetime::Scoped)
                    .disposable(),
            )
            .unwrap();
        provider
    }

    #[test]
    #[traced_test]
    fn test_undisposed_drop_warns() {
        let provider = provider_with_handle(ContainerOptions::default());
        let root = provider.root_scope().unwrap();
        {
            let request = provider.create_request_scope(&root, "r1", None).unwrap();
            request.get::<Handle>().unwrap();
        }
        assert!(logs_contain("scope dropped with undisposed resources"));
    }

    #[test]
    #[traced_test]
    fn test_undisposed_drop_warning_can_be_disabled() {
        let provider = provider_with_handle(ContainerOptions {
            warn_on_undisposed_drop: false,
            ..ContainerOptions::default()
        });
        let root = provider.root_scope().unwrap();
        {
            let request = provider.create_request_scope(&root, "r1", None).unwrap();
            request.get::<Handle>().unwrap();
        }
        assert!(!logs_contain("undisposed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_disposed_scope_drops_silently() {
        let provider = provider_with_handle(ContainerOptions::default());
        let root = provider.root_scope().unwrap();
        let request = provider.create_request_scope(&root, "r1", None).unwrap();
        request.get::<Handle>().unwrap();
        request.dispose().await;
        drop(request);
        assert!(!logs_contain("undisposed"));
    }

    #[test]
    #[traced_test]
    fn test_trace_resolutions_option() {
        let provider = ServiceProvider::builder()
            .options(ContainerOptions {
                trace_resolutions: true,
                ..ContainerOptions::default()
            })
            .build();
        provider
            .register_instance(&ServiceKey::<u16>::token("port"), 8080)
            .unwrap();
        let key = provider.descriptors()[0].key;

        provider.root_scope().unwrap().resolve_any(&key).unwrap();
        assert!(logs_contain("service resolved"));
    }

    #[test]
    fn test_ancestor_walks_to_root() {
        let provider = ServiceProvider::new();
        let root = provider.root_scope().unwrap();
        let tenant = provider.create_tenant_scope("acme").unwrap();
        let request = provider.create_request_scope(&tenant, "r1", None).unwrap();

        assert!(request.root().ptr_eq(&root));
        assert!(request.ancestor(ScopeLevel::Tenant).unwrap().ptr_eq(&tenant));
        assert_eq!(root.live_children().len(), 1);
    }
}
