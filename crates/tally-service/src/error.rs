//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tally_core::BillingError;
use tally_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A debit exceeds the client's total balance.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Duplicate event (idempotency).
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::DuplicateEvent(id) => (
                StatusCode::CONFLICT,
                "duplicate_event",
                format!("Event {id} already processed"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            BillingError::LedgerInconsistent { .. } => Self::Internal(err.to_string()),
            BillingError::InvalidCatalog(_) => Self::BadRequest(err.to_string()),
            err if err.is_reference() => Self::NotFound(err.to_string()),
            err => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StoreError::DuplicateEvent { event_id } => Self::DuplicateEvent(event_id),
            StoreError::Billing(err) => err.into(),
            StoreError::Catalog(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn engine_errors_map_to_statuses() {
        assert_eq!(
            status(BillingError::UnknownFeature {
                feature_id: "nope".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(BillingError::InvalidAmount("zero units".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(BillingError::InsufficientCredits {
                balance: 10,
                required: 20
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status(BillingError::LedgerInconsistent {
                transaction_id: "t".into(),
                reason: "r".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(
            status(StoreError::DuplicateEvent {
                event_id: "evt-1".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(StoreError::AlreadyExists {
                entity: "client",
                id: "x".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(StoreError::NotFound {
                entity: "client",
                id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
    }
}
