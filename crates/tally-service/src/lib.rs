//! Tally HTTP API Service.
//!
//! This crate exposes the billing engine over HTTP:
//!
//! - Catalog reads and replacement
//! - Client registration and lookup
//! - Usage ingestion, credit packs, free credits, discounts, plan changes
//! - Billing summaries, CSV statements and portfolio metrics
//!
//! # Authentication
//!
//! The service supports two API keys:
//!
//! 1. **Admin key** (`x-admin-key`) - catalog, client and ledger management
//! 2. **Service key** (`x-api-key`) - usage reporting from metered services

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers over the in-memory store never await

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
