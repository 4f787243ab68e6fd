//! # tiered-di
//!
//! Hierarchical service-lifetime container: an Application → Tenant → Request
//! scope tree, Singleton / Scoped / Transient lifetimes, and cascading disposal.
//!
//! ## Features
//!
//! - **Scope tree**: long-lived tenant scopes cached by tenant id, short-lived
//!   request scopes under them (or directly under the application scope)
//! - **Lifetimes**: provider-wide singletons, per-scope instances with a
//!   minimum scope level, and transients built on every call
//! - **Cascading disposal**: children first, then cached instances in reverse
//!   creation order; teardown errors are reported, never fatal
//! - **Cycle detection**: recursive factories fail with the offending path
//!   instead of overflowing the stack
//! - **Observer hooks**: scope lifecycle, resolution and disposal-error events
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tiered_di::{Resolver, ServiceKey, ServiceProvider};
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let provider = ServiceProvider::new();
//! provider.register_instance(&ServiceKey::<Database>::of_type(), Database {
//!     connection_string: "postgres://localhost".to_string(),
//! }).unwrap();
//! provider.register_scoped(&ServiceKey::<UserService>::of_type(), |scope| {
//!     Ok(UserService { db: scope.get::<Database>()? })
//! }, None).unwrap();
//!
//! let root = provider.root_scope().unwrap();
//! let request = provider.create_request_scope(&root, "req-1", None).unwrap();
//! let users = request.get::<UserService>().unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Service Lifetimes
//!
//! - **Singleton**: created once per provider, always built against the root scope
//! - **Scoped**: created once per scope that resolves it (default minimum level: Request)
//! - **Transient**: created fresh on every resolution
//!
//! ## Disposal
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use tiered_di::{DescriptorBuilder, Dispose, Lifetime, Resolver, ServiceKey, ServiceProvider};
//!
//! struct Connection(Arc<AtomicBool>);
//!
//! impl Dispose for Connection {
//!     fn dispose(&self) -> anyhow::Result<()> {
//!         self.0.store(true, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let closed = Arc::new(AtomicBool::new(false));
//! let flag = closed.clone();
//!
//! let provider = ServiceProvider::new();
//! provider.register(
//!     DescriptorBuilder::new()
//!         .key(&ServiceKey::<Connection>::of_type())
//!         .factory(move |_| Ok(Connection(flag.clone())))
//!         .lifetime(Lifetime::Scoped)
//!         .disposable(),
//! ).unwrap();
//!
//! let tenant = provider.create_tenant_scope("acme").unwrap();
//! let request = provider.create_request_scope(&tenant, "req-1", None).unwrap();
//! request.get::<Connection>().unwrap();
//!
//! // Disposing the tenant cascades into the request scope first.
//! provider.dispose_tenant_scope("acme").await.unwrap();
//! assert!(closed.load(Ordering::SeqCst));
//! assert!(request.is_disposed());
//! # }
//! ```

pub mod config;
pub mod descriptors;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod provider;
pub mod traits;

mod internal;
mod registration;

pub use config::ContainerOptions;
pub use descriptors::{
    AsyncTeardown, DescriptorBuilder, DescriptorInfo, ServiceDescriptor, SyncTeardown, Teardown,
    TeardownFuture,
};
pub use diagnostics::ScopeSnapshot;
pub use error::{DiError, DiResult};
pub use handle::ProviderHandle;
pub use key::{key_of_type, Key, ServiceKey};
pub use lifetime::{Lifetime, ScopeLevel};
pub use observer::{ScopeObserver, TracingObserver};
pub use provider::{Scope, ScopeId, ScopeMetadata, ServiceProvider, ServiceProviderBuilder};
pub use registration::ServiceRegistry;
pub use traits::{AnyArc, AsyncDispose, Dispose, Resolver, ResolverCore};
