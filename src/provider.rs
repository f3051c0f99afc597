//! Provider selection state
//!
//! Explicit session state shared by the model selector and the chat
//! session. Selection is checked against the most recent set of providers
//! the backend reported; shrinking that set never resets the selection.

use crate::models::{ModelConfig, Provider};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    selected: Provider,
    available: Vec<Provider>,
    /// Provider the backend uses when a request names none.
    backend_default: Option<String>,
}

impl Default for ProviderSelection {
    fn default() -> Self {
        Self::new(Provider::default())
    }
}

impl ProviderSelection {
    /// Nothing is available until the backend has been observed.
    pub fn new(initial: Provider) -> Self {
        Self {
            selected: initial,
            available: Vec::new(),
            backend_default: None,
        }
    }

    pub fn current(&self) -> Provider {
        self.selected
    }

    pub fn available(&self) -> &[Provider] {
        &self.available
    }

    pub fn backend_default(&self) -> Option<&str> {
        self.backend_default.as_deref()
    }

    /// True when the selection is no longer in the reported set.
    pub fn is_stale(&self) -> bool {
        !self.available.is_empty() && !self.available.contains(&self.selected)
    }

    /// Replace the available set with what the backend just reported.
    pub fn observe(&mut self, config: &ModelConfig) {
        self.available = config.known_providers();
        self.backend_default = Some(config.current_provider.clone()).filter(|p| !p.is_empty());

        info!(
            available = ?self.available,
            selected = %self.selected,
            stale = self.is_stale(),
            "Observed available providers"
        );
    }

    /// Select `provider` if the backend reported it; otherwise no-op.
    /// Returns whether the selection was accepted.
    pub fn set_provider(&mut self, provider: Provider) -> bool {
        if !self.available.contains(&provider) {
            debug!(%provider, "Provider not available, selection unchanged");
            return false;
        }
        self.selected = provider;
        true
    }
}

/// Handle to one selection shared between views
pub type SharedProviderSelection = Arc<RwLock<ProviderSelection>>;

pub fn shared(selection: ProviderSelection) -> SharedProviderSelection {
    Arc::new(RwLock::new(selection))
}
