//! Teardown capabilities for resolved instances.

/// Synchronous teardown capability.
///
/// A service opts in at registration time with
/// [`DescriptorBuilder::disposable`](crate::DescriptorBuilder::disposable); the
/// container then calls `dispose` when the scope (or provider) that cached the
/// instance is disposed. Errors and panics are contained: they are reported to
/// [`ScopeObserver::on_disposal_error`](crate::ScopeObserver::on_disposal_error)
/// and the cascade continues with the next instance.
///
/// # Examples
///
/// ```
/// use tiered_di::{DescriptorBuilder, Dispose, Lifetime, ServiceKey, ServiceProvider};
///
/// struct Cache {
///     name: String,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) -> anyhow::Result<()> {
///         println!("Flushing cache: {}", self.name);
///         Ok(())
///     }
/// }
///
/// let provider = ServiceProvider::new();
/// provider.register(
///     DescriptorBuilder::new()
///         .key(&ServiceKey::<Cache>::of_type())
///         .factory(|_| Ok(Cache { name: "user_cache".to_string() }))
///         .lifetime(Lifetime::Scoped)
///         .disposable(),
/// ).unwrap();
/// ```
pub trait Dispose: Send + Sync + 'static {
    fn dispose(&self) -> anyhow::Result<()>;
}

/// Asynchronous teardown capability.
///
/// Awaited during disposal in place of [`Dispose`]. Declared with
/// [`DescriptorBuilder::async_disposable`](crate::DescriptorBuilder::async_disposable).
///
/// # Examples
///
/// ```
/// use tiered_di::{AsyncDispose, DescriptorBuilder, Lifetime, ServiceKey, ServiceProvider};
/// use async_trait::async_trait;
///
/// struct DatabaseClient {
///     connection_id: String,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for DatabaseClient {
///     async fn dispose(&self) -> anyhow::Result<()> {
///         println!("Closing database connection: {}", self.connection_id);
///         Ok(())
///     }
/// }
///
/// let provider = ServiceProvider::new();
/// provider.register(
///     DescriptorBuilder::new()
///         .key(&ServiceKey::<DatabaseClient>::of_type())
///         .factory(|_| Ok(DatabaseClient { connection_id: "conn_123".to_string() }))
///         .lifetime(Lifetime::Singleton)
///         .async_disposable(),
/// ).unwrap();
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    async fn dispose(&self) -> anyhow::Result<()>;
}
