//! Service lifetimes and scope levels.

use std::fmt;

/// Service lifetimes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tiered_di::{Resolver, ScopeLevel, ServiceKey, ServiceProvider};
///
/// struct Database { url: String }
/// struct Repository { db_url: String }
/// struct RequestModel { id: u32 }
///
/// let provider = ServiceProvider::new();
///
/// // Singleton: one instance for the whole provider
/// provider.register_singleton(&ServiceKey::<Database>::of_type(), |_| {
///     Ok(Database { url: "postgres://localhost".to_string() })
/// }).unwrap();
///
/// // Scoped: one instance per request scope
/// provider.register_scoped(&ServiceKey::<Repository>::of_type(), |scope| {
///     let db = scope.get::<Database>()?;
///     Ok(Repository { db_url: db.url.clone() })
/// }, None).unwrap();
///
/// // Transient: new instance every time
/// provider.register_transient(&ServiceKey::<RequestModel>::of_type(), |_| {
///     Ok(RequestModel { id: 12345 })
/// }).unwrap();
///
/// let root = provider.root_scope().unwrap();
/// let request = provider.create_request_scope(&root, "req-1", None).unwrap();
///
/// let db1 = root.get::<Database>().unwrap();
/// let db2 = request.get::<Database>().unwrap();
/// assert!(Arc::ptr_eq(&db1, &db2));
///
/// let repo1 = request.get::<Repository>().unwrap();
/// let repo2 = request.get::<Repository>().unwrap();
/// assert!(Arc::ptr_eq(&repo1, &repo2));
///
/// let model1 = request.get::<RequestModel>().unwrap();
/// let model2 = request.get::<RequestModel>().unwrap();
/// assert!(!Arc::ptr_eq(&model1, &model2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Single instance per provider, created lazily on first resolution
    ///
    /// The factory always runs against the root (Application) scope, whichever
    /// scope asked for the service, so singletons can only depend on other
    /// singletons and instances.
    Singleton,
    /// Single instance per scope that satisfies the minimum level
    ///
    /// Cached on the scope that performed the first resolution. Child scopes
    /// never see their parent's instance unless resolution is performed
    /// against the parent explicitly.
    Scoped,
    /// New instance per resolution, never cached
    Transient,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        };
        f.write_str(name)
    }
}

/// Depth of a scope in the Application → Tenant → Request tree.
///
/// Levels are totally ordered; a child scope must always be strictly deeper
/// than its parent.
///
/// ```rust
/// use tiered_di::ScopeLevel;
///
/// assert!(ScopeLevel::Application < ScopeLevel::Tenant);
/// assert!(ScopeLevel::Tenant < ScopeLevel::Request);
/// assert_eq!(ScopeLevel::Request.depth(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ScopeLevel {
    Application = 0,
    Tenant = 1,
    Request = 2,
}

impl ScopeLevel {
    /// Numeric depth: 0 for Application, 1 for Tenant, 2 for Request.
    #[inline]
    pub fn depth(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            ScopeLevel::Application => "application",
            ScopeLevel::Tenant => "tenant",
            ScopeLevel::Request => "request",
        }
    }

    /// Returns true if a scope at `child` may be created under a scope at `self`.
    #[inline]
    pub fn admits_child(self, child: ScopeLevel) -> bool {
        child > self
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
