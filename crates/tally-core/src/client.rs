//! The client aggregate.
//!
//! A [`Client`] owns its credit pools, its transaction log and its usage
//! snapshots. Only [`crate::Ledger`] mutates those.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::credits::{CreditBalance, CreditTransaction};
use crate::error::{BillingError, Result};
use crate::ids::{ClientId, DiscountId, FeatureId, PackId, PlanId};
use crate::period::BillingPeriod;

/// A billed client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client id.
    pub id: ClientId,

    /// Organization name.
    pub name: String,

    /// Database the client's records live in.
    pub db_name: String,

    /// Free-form segment, e.g. `"Nonprofit"`.
    #[serde(default)]
    pub client_type: String,

    /// Account status.
    pub status: ClientStatus,

    /// Subscribed plan.
    pub plan_id: PlanId,

    /// Database records, for record-based plans.
    #[serde(default)]
    pub record_count: u64,

    /// Date the client signed up.
    pub created_on: NaiveDate,

    /// First day of the open billing period.
    pub billing_period_start: NaiveDate,

    /// Credit pools.
    pub balance: CreditBalance,

    /// Usage snapshot of the open period.
    pub current_usage: ClientUsage,

    /// Frozen snapshots of closed periods.
    #[serde(default)]
    pub history: BTreeMap<BillingPeriod, ClientUsage>,

    /// Append-only transaction log, oldest first.
    #[serde(default)]
    pub transactions: Vec<CreditTransaction>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Create a client with empty pools and an open period containing `now`.
    #[must_use]
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        db_name: impl Into<String>,
        plan_id: PlanId,
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        let period = BillingPeriod::containing(today);
        Self {
            id,
            name: name.into(),
            db_name: db_name.into(),
            client_type: String::new(),
            status: ClientStatus::Active,
            plan_id,
            record_count: 0,
            created_on: today,
            billing_period_start: period.first_day(),
            balance: CreditBalance::default(),
            current_usage: ClientUsage::new(period),
            history: BTreeMap::new(),
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The open billing period.
    #[must_use]
    pub const fn current_period(&self) -> BillingPeriod {
        self.current_usage.period
    }

    /// Credits remaining across all pools.
    #[must_use]
    pub const fn credits_remaining(&self) -> i64 {
        self.balance.total()
    }

    /// Usage snapshot for `period`, open or closed.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::PeriodNotFound` if no snapshot exists.
    pub fn usage_for(&self, period: BillingPeriod) -> Result<&ClientUsage> {
        if period == self.current_period() {
            return Ok(&self.current_usage);
        }
        self.history
            .get(&period)
            .ok_or_else(|| BillingError::PeriodNotFound {
                period: period.to_string(),
            })
    }

    /// Transactions dated inside `period`, oldest first.
    pub fn transactions_in(&self, period: BillingPeriod) -> impl Iterator<Item = &CreditTransaction> {
        self.transactions
            .iter()
            .filter(move |tx| period.contains(tx.occurred_at.date_naive()))
    }
}

/// Account status of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Paying customer.
    Active,
    /// Evaluating the product.
    Trial,
    /// Has an unpaid invoice.
    PastDue,
    /// No longer subscribed.
    Canceled,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "Active",
            Self::Trial => "Trial",
            Self::PastDue => "Past Due",
            Self::Canceled => "Canceled",
        })
    }
}

/// Usage snapshot for one billing period.
///
/// Mutated by the ledger while the period is open, frozen when it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientUsage {
    /// The period this snapshot covers.
    pub period: BillingPeriod,

    /// Plan in effect when the period closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,

    /// Credits consumed in the period.
    pub total_credits_used: i64,

    /// Final bill, set when the period closes.
    #[serde(default)]
    pub total_bill: Decimal,

    /// Per-feature usage.
    #[serde(default)]
    pub feature_usage: Vec<FeatureUsage>,

    /// Packs bought in the period.
    #[serde(default)]
    pub add_ons: Vec<PackId>,

    /// Discounts applied at bill finalization.
    #[serde(default)]
    pub discounts: Vec<Discount>,

    /// One-time charges, such as pack purchases.
    #[serde(default)]
    pub one_time_charges: Vec<OneTimeCharge>,
}

impl ClientUsage {
    /// An empty snapshot.
    #[must_use]
    pub const fn new(period: BillingPeriod) -> Self {
        Self {
            period,
            plan_id: None,
            total_credits_used: 0,
            total_bill: Decimal::ZERO,
            feature_usage: Vec::new(),
            add_ons: Vec::new(),
            discounts: Vec::new(),
            one_time_charges: Vec::new(),
        }
    }

    /// Add usage for a feature. Leaves the snapshot untouched on error.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if a running total overflows.
    pub fn record(&mut self, feature_id: &FeatureId, units: u64, credits: i64) -> Result<()> {
        let period = self.period;
        let overflow =
            || BillingError::InvalidAmount(format!("usage of {feature_id} overflows the {period} totals"));
        let total = self
            .total_credits_used
            .checked_add(credits)
            .ok_or_else(overflow)?;

        match self.feature_usage.iter().position(|u| &u.feature_id == feature_id) {
            Some(index) => {
                let usage = &self.feature_usage[index];
                let units = usage.units.checked_add(units).ok_or_else(overflow)?;
                let credits = usage.credits.checked_add(credits).ok_or_else(overflow)?;
                let usage = &mut self.feature_usage[index];
                usage.units = units;
                usage.credits = credits;
            }
            None => self.feature_usage.push(FeatureUsage {
                feature_id: feature_id.clone(),
                units,
                credits,
            }),
        }
        self.total_credits_used = total;
        Ok(())
    }

    /// Sum of one-time charges.
    #[must_use]
    pub fn one_time_total(&self) -> Decimal {
        self.one_time_charges.iter().map(|c| c.amount).sum()
    }
}

/// Units and credits a feature accrued in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureUsage {
    /// Feature id.
    pub feature_id: FeatureId,
    /// Units recorded.
    pub units: u64,
    /// Credits charged for those units.
    #[serde(default)]
    pub credits: i64,
}

/// A charge billed once, outside the subscription fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneTimeCharge {
    /// Statement line.
    pub description: String,
    /// Dollars.
    pub amount: Decimal,
    /// Pack that caused the charge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_id: Option<PackId>,
}

/// How a discount reduces the bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// A flat dollar amount.
    Fixed,
    /// A percentage of base fee plus overage cost.
    Percentage,
}

/// A discount on one billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    /// Discount id.
    pub id: DiscountId,
    /// Statement line.
    pub description: String,
    /// Fixed or percentage.
    pub kind: DiscountKind,
    /// Dollars for fixed discounts, percent for percentage discounts.
    pub value: Decimal,
    /// Recurring discounts carry into the next period.
    #[serde(default)]
    pub recurring: bool,
}

impl Discount {
    /// Build a validated discount.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidDiscount` if the value is not positive or
    /// a percentage exceeds 100.
    pub fn new(
        description: impl Into<String>,
        kind: DiscountKind,
        value: Decimal,
        recurring: bool,
    ) -> Result<Self> {
        let discount = Self {
            id: DiscountId::generate(),
            description: description.into(),
            kind,
            value,
            recurring,
        };
        discount.validate()?;
        Ok(discount)
    }

    /// Check the value range.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidDiscount` on a malformed value.
    pub fn validate(&self) -> Result<()> {
        if self.value <= Decimal::ZERO {
            return Err(BillingError::InvalidDiscount(format!(
                "value must be positive, got {}",
                self.value
            )));
        }
        if self.kind == DiscountKind::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(BillingError::InvalidDiscount(format!(
                "percentage must be at most 100, got {}",
                self.value
            )));
        }
        Ok(())
    }

    /// Dollars taken off given the base fee plus overage cost.
    #[must_use]
    pub fn amount(&self, chargeable: Decimal) -> Decimal {
        match self.kind {
            DiscountKind::Fixed => self.value,
            DiscountKind::Percentage => chargeable * self.value / Decimal::ONE_HUNDRED,
        }
    }
}
