//! Explicitly shared provider slot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{DiError, DiResult};
use crate::provider::ServiceProvider;

/// Holder for an application's provider, passed around explicitly.
///
/// Replaces process-wide provider state: hosts create one handle at startup,
/// hand clones to whatever needs the container, and tests call
/// [`reset`](Self::reset) to tear the provider down between cases.
///
/// # Examples
///
/// ```
/// use tiered_di::{ProviderHandle, ServiceProvider};
///
/// # #[tokio::main]
/// # async fn main() {
/// let handle = ProviderHandle::new();
/// handle.initialize(ServiceProvider::new()).unwrap();
/// assert!(handle.initialize(ServiceProvider::new()).is_err());
///
/// let provider = handle.get().unwrap();
/// handle.reset().await;
/// assert!(handle.get().is_none());
/// assert!(provider.is_disposed());
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ProviderHandle {
    slot: Arc<RwLock<Option<ServiceProvider>>>,
}

impl ProviderHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `provider`. Fails with [`DiError::AlreadyInitialized`] if the
    /// handle already holds one.
    pub fn initialize(&self, provider: ServiceProvider) -> DiResult<()> {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return Err(DiError::AlreadyInitialized);
        }
        *slot = Some(provider);
        Ok(())
    }

    pub fn get(&self) -> Option<ServiceProvider> {
        self.slot.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Disposes the held provider, if any, and empties the handle.
    pub async fn reset(&self) {
        let provider = self.slot.write().take();
        if let Some(provider) = provider {
            provider.dispose().await;
        }
    }
}
