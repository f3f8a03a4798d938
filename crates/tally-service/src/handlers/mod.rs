//! API handlers.

pub mod billing;
pub mod catalog;
pub mod clients;
pub mod health;
pub mod ledger;
pub mod portfolio;

use tally_core::ClientId;

use crate::error::ApiError;

/// Parse a client id from a path segment.
pub(crate) fn parse_client_id(raw: &str) -> Result<ClientId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid client ID: {raw}")))
}
