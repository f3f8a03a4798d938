//! Catalog handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use tally_core::Catalog;
use tally_store::Store;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Get the current catalog snapshot.
pub async fn get_catalog(State(state): State<Arc<AppState>>, _auth: AdminAuth) -> Json<Catalog> {
    Json(state.store.catalog().as_ref().clone())
}

/// Replace the catalog.
///
/// The new catalog is validated first; running calculations keep the
/// snapshot they started with.
pub async fn replace_catalog(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<Catalog>,
) -> Result<Json<Catalog>, ApiError> {
    let catalog = state.store.replace_catalog(body)?;

    tracing::info!(
        admin_id = %auth.admin_id,
        plans = catalog.plans.len(),
        packs = catalog.packs.len(),
        features = catalog.features.len(),
        "Catalog replaced"
    );

    Ok(Json(catalog.as_ref().clone()))
}
