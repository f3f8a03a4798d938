//! Application state shared across handlers.

use std::sync::Arc;

use tally_store::MemoryStore;

use crate::config::ServiceConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The client and catalog store.
    pub store: Arc<MemoryStore>,
    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, config: ServiceConfig) -> Self {
        Self { store, config }
    }
}
