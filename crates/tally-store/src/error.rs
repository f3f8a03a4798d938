//! Error types for tally storage.

use tally_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Its id.
        id: String,
    },

    /// A record with this id already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Its id.
        id: String,
    },

    /// Duplicate event (idempotency check failed).
    #[error("duplicate event: {event_id}")]
    DuplicateEvent {
        /// The event ID that was duplicated.
        event_id: String,
    },

    /// The engine rejected the operation.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// The catalog file could not be read.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl StoreError {
    pub(crate) fn client_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "client",
            id: id.to_string(),
        }
    }
}
