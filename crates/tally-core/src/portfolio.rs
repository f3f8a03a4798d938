//! Portfolio metrics across all clients: recurring revenue, outstanding credit
//! liability, usage alerts and per-feature margins.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::catalog::Catalog;
use crate::client::Client;
use crate::credits::CreditBalance;
use crate::ids::{ClientId, FeatureId};
use crate::policy::BillingPolicy;

/// Dashboard figures for a set of clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioOverview {
    /// Number of clients.
    pub client_count: usize,

    /// Monthly recurring revenue: base and record fees.
    pub total_mrr: Decimal,

    /// Credits consumed in the open periods.
    pub total_credits_used: i64,

    /// Plan allotments across clients.
    pub total_credits_allocated: i64,

    /// Credits left across all pools.
    pub total_credits_remaining: i64,

    /// Unused credits by pool.
    pub liability: CreditBalance,

    /// Mean credits remaining per client.
    pub average_liability: Decimal,

    /// Client counts per liability tier.
    pub liability_tiers: LiabilityTiers,

    /// Clients above the high-liability threshold, largest first.
    pub high_liability_clients: Vec<HighLiabilityClient>,

    /// Feature with the most credits this period.
    pub most_used_feature: Option<FeatureCredits>,

    /// Clients far above or below their allotment.
    pub alerts: Vec<UsageAlert>,

    /// Revenue, cost and margin per feature.
    pub feature_margins: Vec<FeatureMargin>,
}

/// Client counts per liability tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiabilityTiers {
    /// Below the first bound.
    pub low: usize,
    /// Between the first and second bounds.
    pub medium: usize,
    /// Between the second and third bounds.
    pub high: usize,
    /// At or above the third bound.
    pub critical: usize,
}

/// A client holding many unused credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighLiabilityClient {
    /// Client id.
    pub client_id: ClientId,
    /// Client name.
    pub name: String,
    /// Credits remaining.
    pub credits_remaining: i64,
    /// Percent of the total liability.
    pub share_percent: Decimal,
}

/// Credits attributed to a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCredits {
    /// Feature id.
    pub feature_id: FeatureId,
    /// Feature name.
    pub name: String,
    /// Credits consumed.
    pub credits: i64,
}

/// Kind of usage alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Usage well above the allotment.
    Upsell,
    /// Usage well below the allotment.
    LowUsage,
}

/// A client whose usage is out of line with its plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAlert {
    /// Client id.
    pub client_id: ClientId,
    /// Client name.
    pub name: String,
    /// Upsell or low usage.
    pub kind: AlertKind,
    /// Credits used divided by the allotment.
    pub usage_ratio: Decimal,
}

/// Revenue against internal cost for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMargin {
    /// Feature id.
    pub feature_id: FeatureId,
    /// Feature name.
    pub name: String,
    /// Credits consumed.
    pub credits: i64,
    /// Credits at the system credit price.
    pub revenue: Decimal,
    /// Implied units at the internal unit cost.
    pub cost: Decimal,
    /// Revenue minus cost.
    pub margin: Decimal,
}

/// Compute the dashboard for `clients`.
///
/// Clients whose plan is missing from the catalog still count toward balances
/// and feature totals but contribute no revenue, allotment or alerts.
#[must_use]
pub fn overview(clients: &[Client], catalog: &Catalog, policy: &BillingPolicy) -> PortfolioOverview {
    let mut total_mrr = Decimal::ZERO;
    let mut total_credits_used = 0;
    let mut total_credits_allocated = 0;
    let mut liability = CreditBalance::default();
    let mut tiers = LiabilityTiers::default();
    let mut alerts = Vec::new();
    let mut feature_credits: HashMap<&FeatureId, i64> = HashMap::new();

    let [medium, high, critical] = policy.liability_tiers;

    for client in clients {
        let used = client.current_usage.total_credits_used;
        total_credits_used += used;
        liability.monthly += client.balance.monthly;
        liability.rollover += client.balance.rollover;
        liability.add_on += client.balance.add_on;

        match client.balance.total() {
            n if n < medium => tiers.low += 1,
            n if n < high => tiers.medium += 1,
            n if n < critical => tiers.high += 1,
            _ => tiers.critical += 1,
        }

        for usage in &client.current_usage.feature_usage {
            *feature_credits.entry(&usage.feature_id).or_default() += usage.credits;
        }

        let Ok(plan) = catalog.plan(&client.plan_id) else {
            warn!(client_id = %client.id, plan_id = %client.plan_id, "Client plan not in catalog");
            continue;
        };
        total_mrr += plan.base_fee(client.record_count);
        total_credits_allocated += plan.monthly_credits_included;

        if plan.monthly_credits_included > 0 {
            let ratio = Decimal::from(used) / Decimal::from(plan.monthly_credits_included);
            let kind = if ratio > policy.upsell_usage_ratio {
                Some(AlertKind::Upsell)
            } else if ratio < policy.low_usage_ratio {
                Some(AlertKind::LowUsage)
            } else {
                None
            };
            if let Some(kind) = kind {
                alerts.push(UsageAlert {
                    client_id: client.id,
                    name: client.name.clone(),
                    kind,
                    usage_ratio: ratio.round_dp(2),
                });
            }
        }
    }

    let total_credits_remaining = liability.total();
    let average_liability = if clients.is_empty() {
        Decimal::ZERO
    } else {
        (Decimal::from(total_credits_remaining) / Decimal::from(clients.len())).round_dp(2)
    };

    let mut high_liability_clients: Vec<_> = clients
        .iter()
        .filter(|c| c.balance.total() > policy.high_liability_credits)
        .map(|c| HighLiabilityClient {
            client_id: c.id,
            name: c.name.clone(),
            credits_remaining: c.balance.total(),
            share_percent: if total_credits_remaining > 0 {
                (Decimal::from(c.balance.total()) * Decimal::ONE_HUNDRED
                    / Decimal::from(total_credits_remaining))
                .round_dp(2)
            } else {
                Decimal::ZERO
            },
        })
        .collect();
    high_liability_clients.sort_by(|a, b| b.credits_remaining.cmp(&a.credits_remaining));

    let feature_margins: Vec<_> = catalog
        .features
        .iter()
        .map(|feature| {
            let credits = feature_credits.get(&feature.id).copied().unwrap_or_default();
            let revenue = Decimal::from(credits) * catalog.pricing.credit_purchase_price;
            let cost = feature.implied_units(credits) * feature.cost_per_unit;
            FeatureMargin {
                feature_id: feature.id.clone(),
                name: feature.name.clone(),
                credits,
                revenue: revenue.round_dp(2),
                cost: cost.round_dp(2),
                margin: (revenue - cost).round_dp(2),
            }
        })
        .collect();

    let most_used_feature = feature_margins
        .iter()
        .filter(|m| m.credits > 0)
        .fold(None::<&FeatureMargin>, |best, m| match best {
            Some(b) if b.credits >= m.credits => Some(b),
            _ => Some(m),
        })
        .map(|m| FeatureCredits {
            feature_id: m.feature_id.clone(),
            name: m.name.clone(),
            credits: m.credits,
        });

    PortfolioOverview {
        client_count: clients.len(),
        total_mrr: total_mrr.round_dp(2),
        total_credits_used,
        total_credits_allocated,
        total_credits_remaining,
        liability,
        average_liability,
        liability_tiers: tiers,
        high_liability_clients,
        most_used_feature,
        alerts,
        feature_margins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn client(catalog: &Catalog, name: &str, plan: &str, records: u64, usage: &[(&str, u64)], add_on: i64) -> Client {
        let now = Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap();
        let mut client = Client::new(ClientId::generate(), name, "db", plan.parse().unwrap(), now);
        client.record_count = records;
        let plan = catalog.plan(&client.plan_id).unwrap().clone();
        let mut ledger = Ledger::new(&mut client);
        ledger.allocate_monthly_credits(&plan, plan.monthly_credits_included, now).unwrap();
        if add_on > 0 {
            ledger.adjust_credits(add_on, "grant", now).unwrap();
        }
        for (feature, units) in usage {
            ledger.record_usage(catalog, &feature.parse().unwrap(), *units, now).unwrap();
        }
        client
    }

    #[test]
    fn revenue_liability_and_alerts() {
        let catalog = Catalog::default();
        let clients = vec![
            // 32,000 records -> $160; uses 19,000 of 15,000 (ratio 1.27).
            client(&catalog, "Hope", "professional", 32_000, &[("de", 1_900)], 0),
            // $79 flat; uses 100 of 7,500.
            client(&catalog, "Old Guard", "legacy-standard", 0, &[("ev", 100)], 0),
            // 50,000 allotment plus 60,000 granted, untouched.
            client(&catalog, "Big Co", "enterprise", 10_000, &[], 60_000),
        ];

        let o = overview(&clients, &catalog, &BillingPolicy::default());

        assert_eq!(o.client_count, 3);
        assert_eq!(o.total_mrr, dec!(314));
        assert_eq!(o.total_credits_used, 19_100);
        assert_eq!(o.total_credits_allocated, 72_500);
        assert_eq!(o.total_credits_remaining, 7_400 + 110_000);
        assert_eq!(o.liability.add_on, 60_000);

        assert_eq!(o.liability_tiers.low, 2);
        assert_eq!(o.liability_tiers.critical, 1);
        assert_eq!(o.high_liability_clients.len(), 1);
        assert_eq!(o.high_liability_clients[0].name, "Big Co");

        let kinds: Vec<_> = o.alerts.iter().map(|a| (a.name.as_str(), a.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("Hope", AlertKind::Upsell),
                ("Old Guard", AlertKind::LowUsage),
                ("Big Co", AlertKind::LowUsage)
            ]
        );

        let top = o.most_used_feature.unwrap();
        assert_eq!(top.feature_id.as_str(), "de");
        assert_eq!(top.credits, 19_000);
    }

    #[test]
    fn feature_margin_uses_credit_price_and_unit_cost() {
        let catalog = Catalog::default();
        let clients = vec![client(&catalog, "Hope", "starter", 0, &[("de", 100)], 0)];

        let o = overview(&clients, &catalog, &BillingPolicy::default());
        let de = o.feature_margins.iter().find(|m| m.feature_id.as_str() == "de").unwrap();

        // 1,000 credits x $0.02 = $20; 100 units x $0.05 = $5.
        assert_eq!(de.revenue, dec!(20));
        assert_eq!(de.cost, dec!(5));
        assert_eq!(de.margin, dec!(15));

        let dmp = o.feature_margins.iter().find(|m| m.feature_id.as_str() == "dmp").unwrap();
        assert_eq!(dmp.cost, Decimal::ZERO);
    }

    #[test]
    fn empty_portfolio() {
        let o = overview(&[], &Catalog::default(), &BillingPolicy::default());
        assert_eq!(o.average_liability, Decimal::ZERO);
        assert!(o.most_used_feature.is_none());
        assert!(o.alerts.is_empty());
    }
}
