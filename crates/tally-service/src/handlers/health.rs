//! Health check with store and catalog counts.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use tally_store::Store;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the service answers.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Registered clients.
    pub clients: usize,
    /// Size of the live catalog snapshot.
    pub catalog: CatalogCounts,
}

/// Entries in the catalog snapshot.
#[derive(Debug, Serialize)]
pub struct CatalogCounts {
    /// Plans, offerable or not.
    pub plans: usize,
    /// Credit packs.
    pub packs: usize,
    /// Metered features.
    pub features: usize,
}

/// Health check endpoint. Public.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let catalog = state.store.catalog();
    Json(HealthResponse {
        status: "ok",
        service: "tally",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.store.client_count(),
        catalog: CatalogCounts {
            plans: catalog.plans.len(),
            packs: catalog.packs.len(),
            features: catalog.features.len(),
        },
    })
}
