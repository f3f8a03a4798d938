//! Billing policy knobs.
//!
//! Thresholds that shape recommendations, rollover and portfolio alerts. The
//! defaults are the production values; the service can override them from its
//! environment.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Minimum projected savings (dollars) before recommending a change.
pub const DEFAULT_MATERIALITY_THRESHOLD: Decimal = dec!(10);

/// Share of the plan allotment that may roll over, in percent.
pub const DEFAULT_ROLLOVER_CAP_PERCENT: u32 = 20;

/// Usage above this multiple of the allotment flags an upsell opportunity.
pub const DEFAULT_UPSELL_USAGE_RATIO: Decimal = dec!(1.2);

/// Usage below this multiple of the allotment flags a low-usage client.
pub const DEFAULT_LOW_USAGE_RATIO: Decimal = dec!(0.2);

/// Tunable thresholds for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPolicy {
    /// Savings needed for an upgrade or pack recommendation.
    pub materiality_threshold: Decimal,

    /// Percent of the plan allotment carried into the rollover pool.
    pub rollover_cap_percent: u32,

    /// Upsell alert ratio.
    pub upsell_usage_ratio: Decimal,

    /// Low-usage alert ratio.
    pub low_usage_ratio: Decimal,

    /// Lower bounds (credits) of the medium, high and critical liability tiers.
    pub liability_tiers: [i64; 3],

    /// Balances above this are listed as high-liability clients.
    pub high_liability_credits: i64,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            materiality_threshold: DEFAULT_MATERIALITY_THRESHOLD,
            rollover_cap_percent: DEFAULT_ROLLOVER_CAP_PERCENT,
            upsell_usage_ratio: DEFAULT_UPSELL_USAGE_RATIO,
            low_usage_ratio: DEFAULT_LOW_USAGE_RATIO,
            liability_tiers: [25_000, 50_000, 100_000],
            high_liability_credits: 100_000,
        }
    }
}

impl BillingPolicy {
    /// Maximum credits that may roll over from a plan allotment.
    #[must_use]
    pub fn rollover_cap(&self, monthly_credits_included: i64) -> i64 {
        monthly_credits_included.max(0) * i64::from(self.rollover_cap_percent) / 100
    }
}
