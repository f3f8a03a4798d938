//! Month-end forecasting and plan/pack recommendations.
//!
//! Advisory only: nothing here mutates state.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Catalog, Plan};
use crate::ids::{PackId, PlanId};
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;

/// Projection of the open period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Elapsed days, at least 1.
    pub day_of_month: u32,

    /// Days in the period.
    pub days_in_month: u32,

    /// Average credits per elapsed day.
    pub burn_rate: Decimal,

    /// Credits expected by period end.
    pub projected_total_usage: Decimal,

    /// Projected credits beyond the allotment.
    pub projected_overage: Decimal,

    /// Dollar cost of the projected overage.
    pub projected_overage_cost: Decimal,

    /// Base fee plus projected overage cost.
    pub projected_total_bill: Decimal,

    /// What to do about it.
    pub recommendation: Recommendation,
}

/// The single recommendation for a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Nothing worth changing.
    OnTrack,

    /// Move to the next tier.
    Upgrade {
        /// Target plan.
        plan_id: PlanId,
        /// Target plan name.
        plan_name: String,
        /// Projected bill on the target plan.
        projected_bill: Decimal,
        /// Estimated dollars saved this period.
        savings: Decimal,
    },

    /// Buy a credit pack to absorb the overage.
    Pack {
        /// Pack to buy.
        pack_id: PackId,
        /// Pack name.
        pack_name: String,
        /// Credits in the pack.
        credits: i64,
        /// Pack price.
        price: Decimal,
        /// Estimated dollars saved on overage.
        savings: Decimal,
    },
}

impl Recommendation {
    /// Estimated savings; zero when on track.
    #[must_use]
    pub fn savings(&self) -> Decimal {
        match self {
            Self::OnTrack => Decimal::ZERO,
            Self::Upgrade { savings, .. } | Self::Pack { savings, .. } => *savings,
        }
    }

    /// One-line advice for display.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::OnTrack => "Usage is on track with the current plan.".to_string(),
            Self::Upgrade {
                plan_name, savings, ..
            } => format!(
                "Upgrade to the {plan_name} plan to save an estimated ${savings:.2} this month."
            ),
            Self::Pack {
                pack_name,
                credits,
                savings,
                ..
            } => format!(
                "Purchase the {pack_name} ({credits} credits) to save an estimated ${savings:.2} on overages."
            ),
        }
    }
}

/// Projected bill for `usage` credits on `plan`.
fn projected_bill(plan: &Plan, record_count: u64, usage: Decimal) -> Decimal {
    let overage = (usage - Decimal::from(plan.monthly_credits_included)).max(Decimal::ZERO);
    plan.base_fee(record_count) + plan.overage_cost(overage)
}

/// Project month-end usage from the burn rate so far and pick a recommendation.
///
/// `today` is clamped into `period`, so a period viewed after it ended
/// projects over all of its days.
#[must_use]
pub fn forecast(
    catalog: &Catalog,
    plan: &Plan,
    record_count: u64,
    credits_used: i64,
    period: BillingPeriod,
    today: NaiveDate,
    policy: &BillingPolicy,
) -> Forecast {
    let days_in_month = period.days();
    let day_of_month = if today < period.first_day() {
        1
    } else if period.contains(today) {
        today.day()
    } else {
        days_in_month
    };

    let burn_rate = Decimal::from(credits_used.max(0)) / Decimal::from(day_of_month);
    let projected_total_usage = burn_rate * Decimal::from(days_in_month);
    let projected_overage =
        (projected_total_usage - Decimal::from(plan.monthly_credits_included)).max(Decimal::ZERO);
    let projected_overage_cost = plan.overage_cost(projected_overage);
    let projected_total_bill = plan.base_fee(record_count) + projected_overage_cost;

    let mut recommendation = Recommendation::OnTrack;

    if projected_overage > Decimal::ZERO {
        if let Some(next) = catalog.next_tier(plan) {
            let next_bill = projected_bill(next, record_count, projected_total_usage);
            let savings = projected_total_bill - next_bill;
            if savings > policy.materiality_threshold {
                recommendation = Recommendation::Upgrade {
                    plan_id: next.id.clone(),
                    plan_name: next.name.clone(),
                    projected_bill: next_bill.round_dp(2),
                    savings: savings.round_dp(2),
                };
            }
        }

        if let Some(pack) = catalog.cheapest_covering_pack(projected_overage) {
            let savings = projected_overage_cost - pack.price;
            if savings > policy.materiality_threshold && savings > recommendation.savings() {
                recommendation = Recommendation::Pack {
                    pack_id: pack.id.clone(),
                    pack_name: pack.name.clone(),
                    credits: pack.credits,
                    price: pack.price,
                    savings: savings.round_dp(2),
                };
            }
        }
    }

    debug!(
        plan_id = %plan.id,
        %burn_rate,
        %projected_total_usage,
        %projected_overage,
        "Forecast computed"
    );

    Forecast {
        day_of_month,
        days_in_month,
        burn_rate: burn_rate.round_dp(2),
        projected_total_usage: projected_total_usage.round_dp(2),
        projected_overage: projected_overage.round_dp(2),
        projected_overage_cost: projected_overage_cost.round_dp(2),
        projected_total_bill: projected_total_bill.round_dp(2),
        recommendation,
    }
}
