//! Point-in-time dumps of the scope tree.

use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::lifetime::ScopeLevel;
use crate::provider::{Scope, ScopeId, ScopeMetadata, ServiceProvider};

/// Snapshot of one scope and, recursively, its live children.
///
/// ```
/// use tiered_di::{Resolver, ScopeLevel, ServiceKey, ServiceProvider};
///
/// let provider = ServiceProvider::new();
/// let counter = ServiceKey::<u64>::token("counter");
/// provider.register_scoped(&counter, |_| Ok(0u64), None).unwrap();
///
/// let tenant = provider.create_tenant_scope("acme").unwrap();
/// let request = provider.create_request_scope(&tenant, "r1", None).unwrap();
/// request.get_keyed(&counter).unwrap();
///
/// let snapshot = provider.snapshot().unwrap();
/// assert_eq!(snapshot.level, ScopeLevel::Application);
/// assert_eq!(snapshot.children[0].metadata.tenant_id(), Some("acme"));
/// assert_eq!(snapshot.scope_count(), 3);
/// assert_eq!(snapshot.children[0].children[0].cached_services, vec!["counter".to_string()]);
/// println!("{}", snapshot.to_tree());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ScopeSnapshot {
    pub id: ScopeId,
    pub level: ScopeLevel,
    pub disposed: bool,
    pub metadata: ScopeMetadata,
    /// Display names of instances cached on this scope, in creation order
    pub cached_services: Vec<String>,
    pub children: Vec<ScopeSnapshot>,
}

impl ScopeSnapshot {
    /// Total number of scopes in this subtree, this one included.
    pub fn scope_count(&self) -> usize {
        1 + self.children.iter().map(ScopeSnapshot::scope_count).sum::<usize>()
    }

    /// Indented, human-readable rendering of the subtree.
    pub fn to_tree(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, 0);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let label = self
            .metadata
            .request_id()
            .or(self.metadata.tenant_id())
            .unwrap_or("-");
        let _ = writeln!(
            out,
            "{indent}{} [{}] {}{}",
            self.level,
            label,
            self.id,
            if self.disposed { " (disposed)" } else { "" }
        );
        for service in &self.cached_services {
            let _ = writeln!(out, "{indent}  * {service}");
        }
        for child in &self.children {
            child.write_tree(out, depth + 1);
        }
    }

    /// Pretty-printed JSON rendering of the subtree.
    #[cfg(feature = "diagnostics")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Scope {
    /// Captures this scope and its live descendants.
    pub fn snapshot(&self) -> ScopeSnapshot {
        let cached_services = self
            .inner
            .instances
            .lock()
            .keys()
            .map(|key| key.display_name().to_string())
            .collect();

        ScopeSnapshot {
            id: self.id(),
            level: self.level(),
            disposed: self.is_disposed(),
            metadata: self.metadata().clone(),
            cached_services,
            children: self.live_children().iter().map(Scope::snapshot).collect(),
        }
    }
}

impl ServiceProvider {
    /// Snapshot of the whole tree, or `None` once the provider is disposed.
    pub fn snapshot(&self) -> Option<ScopeSnapshot> {
        self.root_scope().ok().map(|root| root.snapshot())
    }
}
