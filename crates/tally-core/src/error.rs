//! Error types for tally.

use crate::ids::IdError;

/// Result type for tally engine operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in ledger and billing operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BillingError {
    /// The client's subscription tier does not resolve to a catalog plan.
    #[error("unknown plan: {plan_id}")]
    UnknownPlan {
        /// The plan that was not found.
        plan_id: String,
    },

    /// No feature definition exists for the id.
    #[error("unknown feature: {feature_id}")]
    UnknownFeature {
        /// The feature that was not found.
        feature_id: String,
    },

    /// No credit pack exists for the id.
    #[error("unknown credit pack: {pack_id}")]
    UnknownPack {
        /// The pack that was not found.
        pack_id: String,
    },

    /// The feature exists but is switched off and cannot accrue usage.
    #[error("feature is disabled: {feature_id}")]
    FeatureDisabled {
        /// The disabled feature.
        feature_id: String,
    },

    /// No usage snapshot is stored for the requested billing period.
    #[error("no usage recorded for period {period}")]
    PeriodNotFound {
        /// The requested period (`YYYY-MM`).
        period: String,
    },

    /// A billing period selector could not be parsed.
    #[error("invalid billing period: {0:?}")]
    InvalidPeriod(String),

    /// Invalid credit or unit amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Expiration date is not strictly in the future.
    #[error("expiration date {expiration} must be after {today}")]
    InvalidExpiration {
        /// The rejected expiration date.
        expiration: chrono::NaiveDate,
        /// The date the request was evaluated on.
        today: chrono::NaiveDate,
    },

    /// Malformed discount.
    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    /// A debit would take the total balance below zero.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Total available credits.
        balance: i64,
        /// Credits the operation needed.
        required: i64,
    },

    /// Replaying the transaction log did not reproduce the stored balances.
    #[error("ledger inconsistent at transaction {transaction_id}: {reason}")]
    LedgerInconsistent {
        /// The first transaction whose snapshot disagrees.
        transaction_id: String,
        /// What disagreed.
        reason: String,
    },

    /// The catalog snapshot violates a reference-data invariant.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl BillingError {
    /// Lookup failures against the catalog or a client's history.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::UnknownPlan { .. }
                | Self::UnknownFeature { .. }
                | Self::UnknownPack { .. }
                | Self::PeriodNotFound { .. }
        )
    }
}
