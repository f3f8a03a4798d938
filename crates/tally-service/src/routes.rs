//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{billing, catalog, clients, health, ledger, portfolio};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for usage reporting.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Usage (Service API Key auth)
/// - `POST /v1/clients/:id/usage` - Record feature usage
///
/// ## Admin (Admin API Key auth)
/// - `GET|PUT /v1/catalog` - Read or replace the catalog
/// - `GET|POST /v1/clients` - List or register clients
/// - `GET /v1/clients/:id` - Client with balances
/// - `GET /v1/clients/:id/summary` - Billing summary (`?period=current|YYYY-MM`)
/// - `GET /v1/clients/:id/statement` - CSV statement (`?period=...`)
/// - `GET /v1/clients/:id/transactions` - Transaction history, newest first
/// - `POST /v1/clients/:id/packs` - Buy a credit pack
/// - `POST /v1/clients/:id/free-credits` - Grant free credits
/// - `POST /v1/clients/:id/discounts` - Add a discount
/// - `POST /v1/clients/:id/subscription` - Change plan
/// - `POST /v1/clients/:id/adjustments` - Manual credit adjustment
/// - `POST /v1/clients/:id/close-period` - Close the billing period
/// - `GET /v1/portfolio` - Portfolio metrics and alerts
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let usage_routes = Router::new()
        .route("/clients/:id/usage", post(ledger::record_usage))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Catalog
        .route(
            "/catalog",
            get(catalog::get_catalog).put(catalog::replace_catalog),
        )
        // Clients
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route("/clients/:id", get(clients::get_client))
        // Billing
        .route("/clients/:id/summary", get(billing::get_summary))
        .route("/clients/:id/statement", get(billing::get_statement))
        // Ledger
        .route("/clients/:id/transactions", get(ledger::list_transactions))
        .route("/clients/:id/packs", post(ledger::purchase_credit_pack))
        .route("/clients/:id/free-credits", post(ledger::add_free_credits))
        .route("/clients/:id/discounts", post(ledger::add_discount))
        .route("/clients/:id/subscription", post(ledger::change_subscription))
        .route("/clients/:id/adjustments", post(ledger::adjust_credits))
        .route("/clients/:id/close-period", post(ledger::close_period))
        // Portfolio
        .route("/portfolio", get(portfolio::get_portfolio))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Usage routes (with their own concurrency limit)
        .merge(usage_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
