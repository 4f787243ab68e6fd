//! Service registry: identifier to descriptor mapping.

use std::sync::Arc;

use ahash::AHashMap;

use crate::descriptors::{DescriptorBuilder, DescriptorInfo, ServiceDescriptor};
use crate::error::DiResult;
use crate::key::Key;

/// Descriptor store shared by the whole scope tree.
///
/// The registry only maps identifiers to descriptors; it never instantiates
/// anything. Registering an identifier twice replaces the earlier descriptor
/// but keeps its original position in [`all_identifiers`](Self::all_identifiers).
///
/// # Examples
///
/// ```rust
/// use tiered_di::{DescriptorBuilder, Lifetime, ServiceKey, ServiceRegistry};
///
/// let mut registry = ServiceRegistry::new();
/// let key = ServiceKey::<u32>::token("answer");
///
/// registry.register(DescriptorBuilder::new().key(&key).factory(|_| Ok(42u32))).unwrap();
/// assert!(registry.has(key.key()));
/// assert_eq!(registry.get(key.key()).unwrap().lifetime(), Lifetime::Transient);
/// assert_eq!(registry.all_identifiers(), vec![*key.key()]);
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    descriptors: AHashMap<Key, Arc<ServiceDescriptor>>,
    order: Vec<Key>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a descriptor, overwriting any prior one for the same identifier.
    pub fn register<T: Send + Sync + 'static>(
        &mut self,
        builder: DescriptorBuilder<T>,
    ) -> DiResult<Arc<ServiceDescriptor>> {
        let descriptor = Arc::new(builder.build()?);
        let key = *descriptor.key();
        if self.descriptors.insert(key, descriptor.clone()).is_none() {
            self.order.push(key);
        }
        Ok(descriptor)
    }

    pub fn has(&self, key: &Key) -> bool {
        self.descriptors.contains_key(key)
    }

    pub fn get(&self, key: &Key) -> Option<Arc<ServiceDescriptor>> {
        self.descriptors.get(key).cloned()
    }

    /// Identifiers in first-registration order.
    pub fn all_identifiers(&self) -> Vec<Key> {
        self.order.clone()
    }

    pub fn descriptors(&self) -> Vec<DescriptorInfo> {
        self.order
            .iter()
            .filter_map(|key| self.descriptors.get(key))
            .map(|d| d.info())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
