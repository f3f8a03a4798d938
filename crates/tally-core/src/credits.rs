//! Credit pools and ledger entries.
//!
//! A client holds three pools: `monthly` (this period's allotment), `rollover`
//! (carried from the previous period) and `add_on` (packs and grants). Every
//! change to a pool is recorded as an immutable [`CreditTransaction`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{CreditPack, Feature};
use crate::ids::{ClientId, FeatureId, TransactionId};

/// The three credit pools of a client. No pool is ever negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Current period allotment; expires at period close.
    pub monthly: i64,

    /// Credits carried over from the previous period.
    pub rollover: i64,

    /// Purchased or granted credits.
    pub add_on: i64,
}

impl CreditBalance {
    /// Total available credits across all pools.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.monthly + self.rollover + self.add_on
    }

    /// Draw `credits` in priority order monthly, rollover, add-on.
    ///
    /// Pools are emptied but never go negative; whatever they cannot cover is
    /// reported as `uncovered`.
    pub fn draw(&mut self, credits: i64) -> Draw {
        let mut remaining = credits.max(0);
        let mut take = |pool: &mut i64| {
            let taken = remaining.min(*pool);
            *pool -= taken;
            remaining -= taken;
            taken
        };

        let from_monthly = take(&mut self.monthly);
        let from_rollover = take(&mut self.rollover);
        let from_add_on = take(&mut self.add_on);

        Draw {
            from_monthly,
            from_rollover,
            from_add_on,
            uncovered: remaining,
        }
    }
}

/// How a debit was split across the pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    /// Taken from the monthly pool.
    pub from_monthly: i64,
    /// Taken from the rollover pool.
    pub from_rollover: i64,
    /// Taken from the add-on pool.
    pub from_add_on: i64,
    /// Not covered by any pool.
    pub uncovered: i64,
}

impl Draw {
    /// Credits actually removed from pools.
    #[must_use]
    pub const fn covered(&self) -> i64 {
        self.from_monthly + self.from_rollover + self.from_add_on
    }
}

/// An append-only ledger entry.
///
/// `balance_after` is the total balance once this entry is applied. For usage
/// entries the pools may not cover the whole debit, so
/// `balance_after == previous balance_after + amount + uncovered_credits`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The client whose balance was affected.
    pub client_id: ClientId,

    /// When the entry took effect.
    pub occurred_at: DateTime<Utc>,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Human-readable description.
    pub description: String,

    /// Signed credits: negative consumes, positive grants.
    pub amount: i64,

    /// Total balance after this entry.
    pub balance_after: i64,

    /// Part of a debit that no pool could cover.
    #[serde(default)]
    pub uncovered_credits: i64,

    /// Feature that generated usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<FeatureId>,

    /// Units of usage recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<u64>,

    /// Free-form reason, e.g. the expiry of granted credits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,

    /// Additional metadata (plan names, pack price).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CreditTransaction {
    fn new(
        client_id: ClientId,
        transaction_type: TransactionType,
        amount: i64,
        balance_after: i64,
        description: String,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            client_id,
            occurred_at,
            transaction_type,
            description,
            amount,
            balance_after,
            uncovered_credits: 0,
            feature_id: None,
            units: None,
            memo: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Monthly plan allotment.
    #[must_use]
    pub fn monthly_allotment(
        client_id: ClientId,
        amount: i64,
        balance_after: i64,
        plan_name: &str,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            client_id,
            TransactionType::MonthlyAllotment,
            amount,
            balance_after,
            format!("{plan_name} Plan"),
            occurred_at,
        );
        tx.metadata = serde_json::json!({ "plan": plan_name });
        tx
    }

    /// Feature usage debit. The amount is always negative.
    #[must_use]
    pub fn usage(
        client_id: ClientId,
        feature: &Feature,
        units: u64,
        credits: i64,
        draw: Draw,
        balance_after: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            client_id,
            TransactionType::FeatureUsage,
            -credits.abs(),
            balance_after,
            format!("{} ({units} units)", feature.name),
            occurred_at,
        );
        tx.uncovered_credits = draw.uncovered;
        tx.feature_id = Some(feature.id.clone());
        tx.units = Some(units);
        tx.metadata = serde_json::json!({
            "from_monthly": draw.from_monthly,
            "from_rollover": draw.from_rollover,
            "from_add_on": draw.from_add_on,
        });
        tx
    }

    /// Credit pack purchase.
    #[must_use]
    pub fn add_on_purchase(
        client_id: ClientId,
        pack: &CreditPack,
        balance_after: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            client_id,
            TransactionType::AddOnPurchase,
            pack.credits,
            balance_after,
            format!("Purchased {}", pack.name),
            occurred_at,
        );
        tx.metadata = serde_json::json!({
            "pack": pack.id,
            "price": pack.price,
        });
        tx
    }

    /// Complimentary credits with an expiration date.
    #[must_use]
    pub fn free_credits(
        client_id: ClientId,
        amount: i64,
        balance_after: i64,
        expires_on: NaiveDate,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            client_id,
            TransactionType::FreeCredits,
            amount,
            balance_after,
            format!("Free credits added (expires: {expires_on})"),
            occurred_at,
        );
        tx.memo = Some(format!("expires {expires_on}"));
        tx.metadata = serde_json::json!({ "expires_on": expires_on });
        tx
    }

    /// Plan change marker. Moves no credits.
    #[must_use]
    pub fn subscription_change(
        client_id: ClientId,
        from_plan: &str,
        to_plan: &str,
        balance_after: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            client_id,
            TransactionType::SubscriptionChange,
            0,
            balance_after,
            format!("Changed from {from_plan} to {to_plan}"),
            occurred_at,
        );
        tx.metadata = serde_json::json!({ "from": from_plan, "to": to_plan });
        tx
    }

    /// Manual or automatic balance correction.
    #[must_use]
    pub fn adjustment(
        client_id: ClientId,
        amount: i64,
        balance_after: i64,
        reason: String,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            client_id,
            TransactionType::CreditAdjustment,
            amount,
            balance_after,
            reason.clone(),
            occurred_at,
        );
        tx.memo = Some(reason);
        tx
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Plan allotment at period start.
    MonthlyAllotment,

    /// Credits consumed by a feature.
    FeatureUsage,

    /// Overage bought outright.
    OveragePurchase,

    /// Manual correction or expiry.
    CreditAdjustment,

    /// Credit pack purchase.
    AddOnPurchase,

    /// Plan change marker.
    SubscriptionChange,

    /// Complimentary credits.
    FreeCredits,
}

impl TransactionType {
    /// Statement label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MonthlyAllotment => "Monthly Allotment",
            Self::FeatureUsage => "Feature Usage",
            Self::OveragePurchase => "Overage Purchase",
            Self::CreditAdjustment => "Credit Adjustment",
            Self::AddOnPurchase => "Add-On Purchase",
            Self::SubscriptionChange => "Subscription Change",
            Self::FreeCredits => "Free Credits",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
