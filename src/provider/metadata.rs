//! Scope-local metadata inherited down the scope tree.

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

/// Tenant, request and user identity plus free-form values for one scope.
///
/// A child scope starts from its parent's metadata and overlays its own:
/// fields set on the child win, unset fields are inherited, and `values`
/// are merged key by key.
///
/// ```rust
/// use tiered_di::ScopeMetadata;
///
/// let tenant = ScopeMetadata::new().with_tenant("acme").with_value("region", "eu");
/// let request = tenant.overlay(
///     &ScopeMetadata::new().with_request("req-7").with_value("region", "us"),
/// );
///
/// assert_eq!(request.tenant_id(), Some("acme"));
/// assert_eq!(request.request_id(), Some("req-7"));
/// assert_eq!(request.value("region"), Some("us"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScopeMetadata {
    tenant_id: Option<String>,
    request_id: Option<String>,
    user_id: Option<String>,
    values: BTreeMap<String, String>,
}

impl ScopeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Returns `self` with `overrides` applied on top.
    pub fn overlay(&self, overrides: &ScopeMetadata) -> ScopeMetadata {
        let mut merged = self.clone();
        if overrides.tenant_id.is_some() {
            merged.tenant_id = overrides.tenant_id.clone();
        }
        if overrides.request_id.is_some() {
            merged.request_id = overrides.request_id.clone();
        }
        if overrides.user_id.is_some() {
            merged.user_id = overrides.user_id.clone();
        }
        merged
            .values
            .extend(overrides.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
