//! Error types for the service-lifetime container.

use crate::lifetime::ScopeLevel;
use crate::provider::ScopeId;

/// Container errors
///
/// Every structural violation fails fast at the call site with one of these
/// variants. Teardown failures are never returned: they are reported through
/// [`ScopeObserver::on_disposal_error`](crate::ScopeObserver::on_disposal_error)
/// and the disposal cascade carries on.
///
/// # Examples
///
/// ```rust
/// use tiered_di::{DiError, Resolver, ServiceProvider};
///
/// let provider = ServiceProvider::new();
/// let root = provider.root_scope().unwrap();
/// match root.get::<String>() {
///     Err(DiError::NotRegistered(name)) => assert_eq!(name, "alloc::string::String"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DiError {
    /// Resolve target was never registered
    #[error("Service not registered: {0}")]
    NotRegistered(&'static str),
    /// Registration is missing its identifier or factory
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(&'static str),
    /// Resolution requested from a scope shallower than the service's minimum level
    #[error("Scope too shallow for {service}: requires {required}, resolved from {actual}")]
    ScopeTooShallow {
        service: &'static str,
        required: ScopeLevel,
        actual: ScopeLevel,
    },
    /// Child scope is not strictly deeper than its parent, or a request scope
    /// was nested under another request scope
    #[error("Bad scope hierarchy: cannot create {child} scope under {parent} scope")]
    BadScopeHierarchy { parent: ScopeLevel, child: ScopeLevel },
    /// Operation attempted on a scope after `dispose()` started
    #[error("Scope {0} has been disposed")]
    ScopeDisposed(ScopeId),
    /// Operation attempted on a provider after `dispose()` started
    #[error("Service provider has been disposed")]
    ProviderDisposed,
    /// Scope handed to a provider that did not create it
    #[error("Scope {0} belongs to a different provider")]
    ForeignScope(ScopeId),
    /// Registered instance could not be downcast to the requested type
    #[error("Type mismatch for: {0}")]
    TypeMismatch(&'static str),
    /// A factory re-entered a resolution already in progress (includes path)
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Circular(Vec<&'static str>),
    /// Maximum recursion depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),
    /// [`ProviderHandle::initialize`](crate::ProviderHandle::initialize) called twice
    #[error("Provider handle is already initialized")]
    AlreadyInitialized,
    /// A factory returned its own error
    #[error("Factory for {service} failed: {source}")]
    Factory {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl DiError {
    /// Wraps an arbitrary factory failure, attributing it to `service`.
    pub fn factory(service: &'static str, source: impl Into<anyhow::Error>) -> Self {
        DiError::Factory {
            service,
            source: source.into(),
        }
    }

    /// Names the service behind a factory error that was raised without one.
    pub(crate) fn attributed_to(self, service: &'static str) -> Self {
        match self {
            DiError::Factory {
                service: "<factory>",
                source,
            } => DiError::Factory { service, source },
            other => other,
        }
    }

    /// Returns true for errors caused by using a disposed scope or provider.
    pub fn is_disposed(&self) -> bool {
        matches!(self, DiError::ScopeDisposed(_) | DiError::ProviderDisposed)
    }
}

impl From<anyhow::Error> for DiError {
    fn from(source: anyhow::Error) -> Self {
        DiError::Factory {
            service: "<factory>",
            source,
        }
    }
}

/// Result type for container operations
///
/// ```rust
/// use tiered_di::{DiResult, DiError};
///
/// fn lookup() -> DiResult<()> {
///     Err(DiError::NotRegistered("some_service"))
/// }
///
/// assert!(lookup().is_err());
/// ```
pub type DiResult<T> = Result<T, DiError>;
