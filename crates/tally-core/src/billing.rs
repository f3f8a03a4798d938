//! The billing calculator.
//!
//! [`compute_summary`] derives a [`BillingSummary`] from a client snapshot and
//! a catalog snapshot. Summaries are never stored; they are recomputed on
//! demand.
//!
//! For the open period, the feature-usage transactions dated inside it are
//! totalled by the usage aggregator, then replayed in chronological order
//! against the plan allotment: earlier usage is covered by the plan first,
//! later usage becomes overage. Closing a period freezes exactly these
//! charges. Closed periods are read from their frozen snapshot through the
//! same aggregator and carry no plan/overage split.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::catalog::{Catalog, Feature, Plan};
use crate::client::{Client, ClientUsage};
use crate::credits::{CreditTransaction, TransactionType};
use crate::error::Result;
use crate::forecast::{forecast, Forecast};
use crate::ids::{ClientId, FeatureId, PlanId};
use crate::period::{BillingPeriod, PeriodSelector};
use crate::policy::BillingPolicy;
use crate::usage::{aggregate, UsageAggregate, UsageEvent};

// ============================================================================
// Summary types
// ============================================================================

/// Computed bill for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    /// Client billed.
    pub client_id: ClientId,

    /// Period billed.
    pub period: BillingPeriod,

    /// Whether this is the open period.
    pub is_current: bool,

    /// Plan the bill was computed against.
    pub plan_id: PlanId,

    /// Plan name.
    pub plan_name: String,

    /// The plan's allotment.
    pub monthly_credits_included: i64,

    /// Credits consumed in the period.
    pub total_credits_used: i64,

    /// Credits covered by the allotment. Open period only.
    pub credits_from_plan: Option<i64>,

    /// Credits beyond the allotment. Open period only.
    pub overage_credits: Option<i64>,

    /// Dollar cost of the overage. Open period only.
    pub overage_cost: Option<Decimal>,

    /// Credits no pool could cover when they were recorded.
    pub unfunded_credits: i64,

    /// Subscription fee including record-based pricing.
    pub base_fee: Decimal,

    /// Pack purchases and other one-time charges.
    pub one_time_charges: Decimal,

    /// Discounts with their dollar amounts.
    pub discounts: Vec<AppliedDiscount>,

    /// Sum of discount amounts.
    pub discount_total: Decimal,

    /// Amount due, never negative.
    pub total_bill: Decimal,

    /// Credits left across all pools.
    pub credits_remaining: i64,

    /// Usage by category, in catalog order.
    pub categories: Vec<CategoryBreakdown>,

    /// Month-end projection. Open period only.
    pub forecast: Option<Forecast>,
}

/// A discount resolved to dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    /// Statement line.
    pub description: String,
    /// Dollars taken off.
    pub amount: Decimal,
}

/// Usage of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    /// Category name.
    pub category: String,
    /// Credits consumed.
    pub total_credits: i64,
    /// Credits covered by the allotment.
    pub credits_from_plan: Option<i64>,
    /// Credits beyond the allotment.
    pub overage_credits: Option<i64>,
    /// Cost of that overage.
    pub overage_cost: Option<Decimal>,
    /// Features in catalog order.
    pub features: Vec<FeatureBreakdown>,
}

/// Usage of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBreakdown {
    /// Feature id.
    pub feature_id: FeatureId,
    /// Feature name.
    pub name: String,
    /// Units consumed. Derived from credits for the open period, so a
    /// zero-cost feature shows zero.
    pub units: Decimal,
    /// Current credit cost per unit.
    pub credits_per_unit: i64,
    /// Credits consumed.
    pub total_credits: i64,
    /// Credits covered by the allotment.
    pub credits_from_plan: Option<i64>,
    /// Credits beyond the allotment.
    pub overage_credits: Option<i64>,
    /// Cost of that overage.
    pub overage_cost: Option<Decimal>,
}

// ============================================================================
// Charges
// ============================================================================

/// The money side of a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCharges {
    /// Credits consumed by features in the catalog.
    pub credits_used: i64,
    /// Subscription fee.
    pub base_fee: Decimal,
    /// Credits beyond the allotment.
    pub overage_credits: i64,
    /// Their cost.
    pub overage_cost: Decimal,
    /// One-time charges.
    pub one_time_charges: Decimal,
    /// Discounts in dollars.
    pub discounts: Vec<AppliedDiscount>,
    /// Sum of discounts.
    pub discount_total: Decimal,
    /// Amount due, floored at zero.
    pub total_bill: Decimal,
}

/// Price the open period of `client`: the figures its current summary shows
/// and its close freezes.
///
/// # Errors
///
/// - `BillingError::UnknownPlan` if the client's plan is not in the catalog
/// - `BillingError::InvalidAmount` if the period's usage totals overflow
pub fn open_period_charges(client: &Client, catalog: &Catalog) -> Result<PeriodCharges> {
    let plan = catalog.plan(&client.plan_id)?;
    Ok(OpenPeriod::replay(client, catalog, plan)?.charges)
}

/// Percentage discounts apply to base fee plus overage cost; all discounts are
/// summed, then subtracted once.
fn charges_for(plan: &Plan, record_count: u64, credits_used: i64, usage: &ClientUsage) -> PeriodCharges {
    let base_fee = plan.base_fee(record_count);
    let overage_credits = (credits_used - plan.monthly_credits_included).max(0);
    let overage_cost = plan.overage_cost(Decimal::from(overage_credits));
    let one_time_charges = usage.one_time_total();

    let chargeable = base_fee + overage_cost;
    let discounts: Vec<_> = usage
        .discounts
        .iter()
        .map(|d| AppliedDiscount {
            description: d.description.clone(),
            amount: d.amount(chargeable).round_dp(2),
        })
        .collect();
    let discount_total: Decimal = discounts.iter().map(|d| d.amount).sum();

    let total_bill = (chargeable + one_time_charges - discount_total).max(Decimal::ZERO);

    PeriodCharges {
        credits_used,
        base_fee: base_fee.round_dp(2),
        overage_credits,
        overage_cost: overage_cost.round_dp(2),
        one_time_charges: one_time_charges.round_dp(2),
        discounts,
        discount_total,
        total_bill: total_bill.round_dp(2),
    }
}

// ============================================================================
// Calculator
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct Split {
    from_plan: i64,
    overage: i64,
}

/// The open period's usage replayed against the plan allotment.
struct OpenPeriod {
    usage: UsageAggregate,
    splits: HashMap<FeatureId, Split>,
    credits_from_plan: i64,
    unfunded_credits: i64,
    charges: PeriodCharges,
}

impl OpenPeriod {
    fn replay(client: &Client, catalog: &Catalog, plan: &Plan) -> Result<Self> {
        let mut entries: Vec<&CreditTransaction> = client
            .transactions_in(client.current_period())
            .filter(|tx| tx.transaction_type == TransactionType::FeatureUsage)
            .collect();
        entries.sort_by_key(|tx| tx.occurred_at);

        let events: Vec<UsageEvent> = entries
            .iter()
            .filter_map(|tx| UsageEvent::from_transaction(tx))
            .collect();
        let usage = aggregate(&events, catalog)?;

        let mut remaining = plan.monthly_credits_included;
        let mut splits: HashMap<FeatureId, Split> = HashMap::new();
        let mut unfunded_credits = 0;

        for tx in entries {
            // The aggregate has already reported entries for unknown features.
            let Some(feature_id) = tx
                .feature_id
                .as_ref()
                .filter(|id| usage.by_feature.contains_key(*id))
            else {
                continue;
            };

            let credits = tx.amount.abs();
            let from_plan = remaining.min(credits).max(0);
            remaining -= from_plan;

            let split = splits.entry(feature_id.clone()).or_default();
            split.from_plan += from_plan;
            split.overage += credits - from_plan;
            unfunded_credits += tx.uncovered_credits;
        }

        let credits_from_plan: i64 = splits.values().map(|s| s.from_plan).sum();
        debug_assert_eq!(
            credits_from_plan + splits.values().map(|s| s.overage).sum::<i64>(),
            usage.total_credits
        );

        let charges = charges_for(plan, client.record_count, usage.total_credits, &client.current_usage);
        Ok(Self {
            usage,
            splits,
            credits_from_plan,
            unfunded_credits,
            charges,
        })
    }
}

/// Compute the billing summary of `client` for `selector`.
///
/// `today` drives the forecast for the open period.
///
/// # Errors
///
/// - `BillingError::UnknownPlan` if the client's plan is not in the catalog
/// - `BillingError::PeriodNotFound` if no snapshot exists for a past period
/// - `BillingError::InvalidAmount` if the period's usage totals overflow
pub fn compute_summary(
    client: &Client,
    catalog: &Catalog,
    selector: PeriodSelector,
    policy: &BillingPolicy,
    today: NaiveDate,
) -> Result<BillingSummary> {
    match selector {
        PeriodSelector::Past(period) if period != client.current_period() => {
            historical_summary(client, catalog, period)
        }
        _ => current_summary(client, catalog, policy, today),
    }
}

fn current_summary(
    client: &Client,
    catalog: &Catalog,
    policy: &BillingPolicy,
    today: NaiveDate,
) -> Result<BillingSummary> {
    let plan = catalog.plan(&client.plan_id)?;
    let period = client.current_period();
    let open = OpenPeriod::replay(client, catalog, plan)?;
    let total_credits_used = open.usage.total_credits;

    let categories = breakdown(catalog, |feature| {
        let total = open.usage.by_feature.get(&feature.id)?;
        let split = open.splits.get(&feature.id).copied().unwrap_or_default();
        let overage_cost = plan.overage_cost(Decimal::from(split.overage));
        Some(FeatureBreakdown {
            feature_id: feature.id.clone(),
            name: feature.name.clone(),
            units: feature.implied_units(total.total_credits).round_dp(2),
            credits_per_unit: feature.credit_cost,
            total_credits: total.total_credits,
            credits_from_plan: Some(split.from_plan),
            overage_credits: Some(split.overage),
            overage_cost: Some(overage_cost.round_dp(2)),
        })
    });

    let charges = open.charges;
    let forecast = forecast(
        catalog,
        plan,
        client.record_count,
        total_credits_used,
        period,
        today,
        policy,
    );

    debug!(
        client_id = %client.id,
        %period,
        total_credits_used,
        overage_credits = charges.overage_credits,
        total_bill = %charges.total_bill,
        "Billing summary computed"
    );

    Ok(BillingSummary {
        client_id: client.id,
        period,
        is_current: true,
        plan_id: plan.id.clone(),
        plan_name: plan.name.clone(),
        monthly_credits_included: plan.monthly_credits_included,
        total_credits_used,
        credits_from_plan: Some(open.credits_from_plan),
        overage_credits: Some(charges.overage_credits),
        overage_cost: Some(charges.overage_cost),
        unfunded_credits: open.unfunded_credits,
        base_fee: charges.base_fee,
        one_time_charges: charges.one_time_charges,
        discounts: charges.discounts,
        discount_total: charges.discount_total,
        total_bill: charges.total_bill,
        credits_remaining: client.balance.total(),
        categories,
        forecast: Some(forecast),
    })
}

fn historical_summary(client: &Client, catalog: &Catalog, period: BillingPeriod) -> Result<BillingSummary> {
    let snapshot = client.usage_for(period)?;
    let plan = match snapshot.plan_id.as_ref().map(|id| catalog.plan(id)) {
        Some(Ok(plan)) => plan,
        _ => catalog.plan(&client.plan_id)?,
    };

    let events: Vec<UsageEvent> = snapshot.feature_usage.iter().map(UsageEvent::from).collect();
    let usage = aggregate(&events, catalog)?;
    if !usage.skipped.is_empty() {
        warn!(client_id = %client.id, %period, skipped = usage.skipped.len(), "Historical usage references unknown features");
    }

    let categories = breakdown(catalog, |feature| {
        usage
            .by_feature
            .get(&feature.id)
            .filter(|t| t.units > 0 || t.total_credits > 0)
            .map(|t| FeatureBreakdown {
                feature_id: feature.id.clone(),
                name: feature.name.clone(),
                units: Decimal::from(t.units),
                credits_per_unit: feature.credit_cost,
                total_credits: t.total_credits,
                credits_from_plan: None,
                overage_credits: None,
                overage_cost: None,
            })
    });

    // Without the overage split, percentage discounts resolve against the base fee.
    let base_fee = plan.base_fee(client.record_count);
    let discounts: Vec<_> = snapshot
        .discounts
        .iter()
        .map(|d| AppliedDiscount {
            description: d.description.clone(),
            amount: d.amount(base_fee).round_dp(2),
        })
        .collect();

    let unfunded_credits = client
        .transactions_in(period)
        .filter(|tx| tx.transaction_type == TransactionType::FeatureUsage)
        .map(|tx| tx.uncovered_credits)
        .sum();

    Ok(BillingSummary {
        client_id: client.id,
        period,
        is_current: false,
        plan_id: plan.id.clone(),
        plan_name: plan.name.clone(),
        monthly_credits_included: plan.monthly_credits_included,
        total_credits_used: snapshot.total_credits_used,
        credits_from_plan: None,
        overage_credits: None,
        overage_cost: None,
        unfunded_credits,
        base_fee: base_fee.round_dp(2),
        one_time_charges: snapshot.one_time_total().round_dp(2),
        discount_total: discounts.iter().map(|d| d.amount).sum(),
        discounts,
        total_bill: snapshot.total_bill.round_dp(2),
        credits_remaining: client.balance.total(),
        categories,
        forecast: None,
    })
}

/// Group feature lines by category, both in catalog order.
fn breakdown<F>(catalog: &Catalog, mut line: F) -> Vec<CategoryBreakdown>
where
    F: FnMut(&Feature) -> Option<FeatureBreakdown>,
{
    let mut categories: Vec<CategoryBreakdown> = Vec::new();

    for feature in &catalog.features {
        let Some(item) = line(feature) else {
            continue;
        };
        let index = match categories.iter().position(|c| c.category == feature.category) {
            Some(index) => index,
            None => {
                categories.push(CategoryBreakdown {
                    category: feature.category.clone(),
                    total_credits: 0,
                    credits_from_plan: item.credits_from_plan.map(|_| 0),
                    overage_credits: item.overage_credits.map(|_| 0),
                    overage_cost: item.overage_cost.map(|_| Decimal::ZERO),
                    features: Vec::new(),
                });
                categories.len() - 1
            }
        };

        let category = &mut categories[index];
        category.total_credits += item.total_credits;
        category.credits_from_plan = category
            .credits_from_plan
            .zip(item.credits_from_plan)
            .map(|(a, b)| a + b);
        category.overage_credits = category
            .overage_credits
            .zip(item.overage_credits)
            .map(|(a, b)| a + b);
        category.overage_cost = category
            .overage_cost
            .zip(item.overage_cost)
            .map(|(a, b)| a + b);
        category.features.push(item);
    }

    categories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Discount, DiscountKind};
    use crate::forecast::Recommendation;
    use crate::ledger::Ledger;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, hour, 0, 0).unwrap()
    }

    fn id<T: std::str::FromStr>(s: &str) -> T
    where
        T::Err: std::fmt::Debug,
    {
        s.parse().unwrap()
    }

    fn client_on(catalog: &Catalog, plan: &str, records: u64) -> Client {
        let mut client = Client::new(ClientId::generate(), "Hope Foundation", "hope_db", id(plan), at(1, 0));
        client.record_count = records;
        let plan = catalog.plan(&client.plan_id).unwrap().clone();
        Ledger::new(&mut client)
            .allocate_monthly_credits(&plan, plan.monthly_credits_included, at(1, 0))
            .unwrap();
        client
    }

    fn current(client: &Client, catalog: &Catalog, day: u32) -> BillingSummary {
        compute_summary(
            client,
            catalog,
            PeriodSelector::Current,
            &BillingPolicy::default(),
            at(day, 0).date_naive(),
        )
        .unwrap()
    }

    #[test]
    fn allotment_is_consumed_first_come_first_served() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "professional", 0);
        let mut ledger = Ledger::new(&mut client);
        ledger.record_usage(&catalog, &id("de"), 1_000, at(3, 9)).unwrap(); // 10,000
        ledger.record_usage(&catalog, &id("ahm"), 266, at(4, 9)).unwrap(); // 7,980
        ledger.record_usage(&catalog, &id("ev"), 20, at(5, 9)).unwrap(); // 20

        let summary = current(&client, &catalog, 20);

        assert_eq!(summary.total_credits_used, 18_000);
        assert_eq!(summary.credits_from_plan, Some(15_000));
        assert_eq!(summary.overage_credits, Some(3_000));
        assert_eq!(summary.overage_cost, Some(dec!(60)));
        assert_eq!(summary.total_bill, dec!(60));

        let data = &summary.categories[0];
        assert_eq!(data.category, "Data Services");
        assert_eq!(data.features[0].credits_from_plan, Some(10_000));
        assert_eq!(data.features[1].overage_credits, Some(20));

        let ai = &summary.categories[1];
        assert_eq!(ai.credits_from_plan, Some(5_000));
        assert_eq!(ai.overage_credits, Some(2_980));
        assert_eq!(ai.overage_cost, Some(dec!(59.60)));
    }

    #[test]
    fn split_follows_timestamps_not_arrival_order() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "starter", 0);
        let mut ledger = Ledger::new(&mut client);
        // Recorded late but happened first.
        ledger.record_usage(&catalog, &id("ev"), 4_000, at(9, 0)).unwrap();
        ledger.record_usage(&catalog, &id("gaif"), 4_000, at(2, 0)).unwrap();

        let summary = current(&client, &catalog, 10);

        let gaif = &summary.categories[1].features[0];
        assert_eq!(gaif.feature_id.as_str(), "gaif");
        assert_eq!(gaif.credits_from_plan, Some(4_000));
        let ev = &summary.categories[0].features[0];
        assert_eq!(ev.credits_from_plan, Some(1_000));
        assert_eq!(ev.overage_credits, Some(3_000));
    }

    #[test]
    fn conservation_holds() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "starter", 0);
        let mut ledger = Ledger::new(&mut client);
        for (day, feature, units) in [(2, "dtpc", 300), (3, "appends", 120), (4, "ev", 77), (5, "dtsms", 410)] {
            ledger.record_usage(&catalog, &id(feature), units, at(day, 8)).unwrap();
        }

        let s = current(&client, &catalog, 6);

        assert_eq!(
            s.total_credits_used,
            s.credits_from_plan.unwrap() + s.overage_credits.unwrap()
        );
        let by_category: i64 = s.categories.iter().map(|c| c.total_credits).sum();
        assert_eq!(by_category, s.total_credits_used);
        assert_eq!(s.unfunded_credits, s.overage_credits.unwrap());
    }

    #[test]
    fn zero_cost_feature_reports_zero_units() {
        let mut catalog = Catalog::default();
        catalog.features[1].credit_cost = 0;
        let mut client = client_on(&catalog, "starter", 0);
        Ledger::new(&mut client)
            .record_usage(&catalog, &id("ev"), 100, at(2, 0))
            .unwrap();

        let summary = current(&client, &catalog, 3);

        let ev = &summary.categories[0].features[0];
        assert_eq!(ev.total_credits, 0);
        assert_eq!(ev.units, Decimal::ZERO);
        assert_eq!(summary.total_credits_used, 0);
    }

    #[test]
    fn discounts_and_pack_charges() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "professional", 32_000);
        let mut ledger = Ledger::new(&mut client);
        let period = ledger.client().current_period();
        ledger
            .add_discount(period, Discount::new("Nonprofit", DiscountKind::Percentage, dec!(10), true).unwrap())
            .unwrap();
        ledger.purchase_credit_pack(&catalog, &id("pack1"), at(4, 0)).unwrap();

        let summary = current(&client, &catalog, 5);

        // $160 base, $16 off, $25 pack.
        assert_eq!(summary.base_fee, dec!(160));
        assert_eq!(summary.discount_total, dec!(16));
        assert_eq!(summary.one_time_charges, dec!(25));
        assert_eq!(summary.total_bill, dec!(169));
        assert_eq!(summary.credits_remaining, 17_500);
    }

    #[test]
    fn discounts_never_push_the_bill_negative() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "legacy-standard", 0);
        let mut ledger = Ledger::new(&mut client);
        let period = ledger.client().current_period();
        ledger
            .add_discount(period, Discount::new("Goodwill", DiscountKind::Fixed, dec!(500), false).unwrap())
            .unwrap();

        let summary = current(&client, &catalog, 5);

        assert_eq!(summary.discount_total, dec!(500));
        assert_eq!(summary.total_bill, Decimal::ZERO);
    }

    #[test]
    fn unknown_plan_is_an_error() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "starter", 0);
        client.plan_id = id("platinum");

        assert!(matches!(
            compute_summary(&client, &catalog, PeriodSelector::Current, &BillingPolicy::default(), at(2, 0).date_naive()),
            Err(crate::BillingError::UnknownPlan { .. })
        ));
    }

    #[test]
    fn historical_period_reads_the_frozen_snapshot() {
        let catalog = Catalog::default();
        let policy = BillingPolicy::default();
        let mut client = client_on(&catalog, "starter", 0);
        let mut ledger = Ledger::new(&mut client);
        ledger.record_usage(&catalog, &id("de"), 600, at(10, 0)).unwrap(); // 6,000
        let july = ledger.client().current_period();
        ledger
            .close_period(&catalog, &policy, Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap())
            .unwrap();
        ledger.change_subscription(&catalog, &id("professional"), Utc.with_ymd_and_hms(2024, 8, 2, 0, 0, 0).unwrap()).unwrap();

        let summary = compute_summary(
            &client,
            &catalog,
            PeriodSelector::Past(july),
            &policy,
            NaiveDate::from_ymd_opt(2024, 8, 3).unwrap(),
        )
        .unwrap();

        assert!(!summary.is_current);
        assert!(summary.forecast.is_none());
        assert_eq!(summary.plan_id.as_str(), "starter");
        assert_eq!(summary.total_credits_used, 6_000);
        assert_eq!(summary.total_bill, dec!(20));
        assert_eq!(summary.overage_credits, None);
        assert_eq!(summary.categories[0].features[0].units, dec!(600));
        assert_eq!(summary.categories[0].credits_from_plan, None);

        let june = BillingPeriod::new(2024, 6).unwrap();
        assert!(matches!(
            compute_summary(&client, &catalog, PeriodSelector::Past(june), &policy, NaiveDate::from_ymd_opt(2024, 8, 3).unwrap()),
            Err(crate::BillingError::PeriodNotFound { .. })
        ));
    }

    #[test]
    fn current_summary_carries_a_forecast() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "starter", 0);
        Ledger::new(&mut client)
            .record_usage(&catalog, &id("de"), 300, at(10, 0))
            .unwrap();

        let summary = current(&client, &catalog, 10);
        let forecast = summary.forecast.unwrap();

        // 3,000 credits by day 10 of 31 projects 9,300.
        assert_eq!(forecast.projected_total_usage, dec!(9300));
        assert_eq!(forecast.projected_overage_cost, dec!(86));
        assert!(matches!(forecast.recommendation, Recommendation::Upgrade { .. }));
    }

    #[test]
    fn closed_usage_is_not_billed_again_next_period() {
        let catalog = Catalog::default();
        let policy = BillingPolicy::default();
        let august_5 = Utc.with_ymd_and_hms(2024, 8, 5, 9, 0, 0).unwrap();
        let mut client = client_on(&catalog, "starter", 0);
        let mut ledger = Ledger::new(&mut client);
        ledger.record_usage(&catalog, &id("de"), 400, at(31, 12)).unwrap(); // 4,000
        assert!(ledger.record_usage(&catalog, &id("de"), 400, august_5).is_err());
        ledger
            .close_period(&catalog, &policy, Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap())
            .unwrap();
        ledger.record_usage(&catalog, &id("ev"), 25, august_5).unwrap();

        let today = august_5.date_naive();
        let august = compute_summary(&client, &catalog, PeriodSelector::Current, &policy, today).unwrap();
        assert_eq!(august.period.to_string(), "2024-08");
        assert_eq!(august.total_credits_used, 25);
        assert_eq!(august.total_credits_used, client.current_usage.total_credits_used);

        let july = BillingPeriod::new(2024, 7).unwrap();
        let july = compute_summary(&client, &catalog, PeriodSelector::Past(july), &policy, today).unwrap();
        assert_eq!(july.total_credits_used, 4_000);
    }

    #[test]
    fn close_freezes_the_bill_the_summary_showed() {
        let mut catalog = Catalog::default();
        let policy = BillingPolicy::default();
        let mut client = client_on(&catalog, "starter", 0);
        Ledger::new(&mut client)
            .record_usage(&catalog, &id("de"), 1_000, at(5, 0)) // 10,000
            .unwrap();
        assert_eq!(current(&client, &catalog, 6).total_bill, dec!(100));

        // Retiring the feature drops its usage from the open period's bill.
        catalog.features.retain(|f| f.id.as_str() != "de");
        let summary = current(&client, &catalog, 6);
        let frozen = Ledger::new(&mut client)
            .close_period(&catalog, &policy, Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap())
            .unwrap();

        assert_eq!(summary.total_bill, Decimal::ZERO);
        assert_eq!(frozen.total_bill, summary.total_bill);
        assert_eq!(frozen.total_credits_used, summary.total_credits_used);
        assert_eq!(open_period_charges(&client, &catalog).unwrap().total_bill, Decimal::ZERO);
    }

    #[test]
    fn open_period_charges_match_the_summary() {
        let catalog = Catalog::default();
        let mut client = client_on(&catalog, "professional", 32_000);
        let mut ledger = Ledger::new(&mut client);
        ledger.record_usage(&catalog, &id("de"), 1_800, at(3, 0)).unwrap(); // 18,000
        ledger.purchase_credit_pack(&catalog, &id("pack1"), at(4, 0)).unwrap();

        let charges = open_period_charges(&client, &catalog).unwrap();
        let summary = current(&client, &catalog, 5);

        assert_eq!(charges.credits_used, summary.total_credits_used);
        assert_eq!(charges.total_bill, summary.total_bill);
        // $160 base, 3,000 overage at $0.02, $25 pack.
        assert_eq!(charges.total_bill, dec!(245));
    }
}
