//! Portfolio dashboard handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use tally_core::portfolio::overview;
use tally_core::PortfolioOverview;
use tally_store::Store;

use crate::auth::AdminAuth;
use crate::state::AppState;

/// Revenue, liability, alerts and feature margins across all clients.
pub async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Json<PortfolioOverview> {
    let catalog = state.store.catalog();
    let clients = state.store.list_clients();
    Json(overview(&clients, &catalog, &state.config.policy))
}
