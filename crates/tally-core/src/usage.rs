//! Usage aggregation.
//!
//! Turns raw `(feature, units)` events into per-feature and per-category credit
//! totals. Aggregation is order-independent; the plan/overage split, which is
//! not, lives in [`crate::billing`]. The calculator feeds both the open
//! period's ledger entries and closed snapshots through [`aggregate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::catalog::Catalog;
use crate::client::FeatureUsage;
use crate::credits::{CreditTransaction, TransactionType};
use crate::error::{BillingError, Result};
use crate::ids::FeatureId;

/// A raw usage event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Feature used.
    pub feature_id: FeatureId,

    /// Units consumed.
    pub units: u64,

    /// When the usage happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,

    /// Credits already charged for the event. Priced from the catalog when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
}

impl UsageEvent {
    /// Event for a feature-usage ledger entry. Other entry types yield `None`.
    #[must_use]
    pub fn from_transaction(tx: &CreditTransaction) -> Option<Self> {
        if tx.transaction_type != TransactionType::FeatureUsage {
            return None;
        }
        Some(Self {
            feature_id: tx.feature_id.clone()?,
            units: tx.units.unwrap_or_default(),
            occurred_at: Some(tx.occurred_at),
            credits: Some(tx.amount.abs()),
        })
    }
}

impl From<&FeatureUsage> for UsageEvent {
    fn from(usage: &FeatureUsage) -> Self {
        Self {
            feature_id: usage.feature_id.clone(),
            units: usage.units,
            occurred_at: None,
            credits: Some(usage.credits),
        }
    }
}

/// Units and credits for one feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTotal {
    /// Units consumed.
    pub units: u64,
    /// Credits consumed.
    pub total_credits: i64,
}

/// Credits for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    /// Credits consumed.
    pub total_credits: i64,
}

/// Aggregated usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAggregate {
    /// Totals keyed by feature.
    pub by_feature: BTreeMap<FeatureId, FeatureTotal>,

    /// Totals keyed by category name.
    pub by_category: BTreeMap<String, CategoryTotal>,

    /// Credits across all features.
    pub total_credits: i64,

    /// Events whose feature is not in the catalog.
    pub skipped: Vec<FeatureId>,
}

fn checked<T>(sum: Option<T>) -> Result<T> {
    sum.ok_or_else(|| BillingError::InvalidAmount("usage totals overflow the credit counter".into()))
}

/// Group usage events by feature and category.
///
/// Events for features missing from the catalog are logged, listed in
/// `skipped` and left out of the totals.
///
/// # Errors
///
/// Returns `BillingError::InvalidAmount` if a unit or credit total overflows.
pub fn aggregate<'a, I>(events: I, catalog: &Catalog) -> Result<UsageAggregate>
where
    I: IntoIterator<Item = &'a UsageEvent>,
{
    let mut out = UsageAggregate::default();

    for event in events {
        let Some(feature) = catalog.find_feature(&event.feature_id) else {
            warn!(feature_id = %event.feature_id, units = event.units, "Skipping usage for unknown feature");
            out.skipped.push(event.feature_id.clone());
            continue;
        };
        let credits = match event.credits {
            Some(credits) => credits,
            None => feature.credits_for(event.units)?,
        };

        let total = out.by_feature.entry(feature.id.clone()).or_default();
        total.units = checked(total.units.checked_add(event.units))?;
        total.total_credits = checked(total.total_credits.checked_add(credits))?;

        let category = out.by_category.entry(feature.category.clone()).or_default();
        category.total_credits = checked(category.total_credits.checked_add(credits))?;

        out.total_credits = checked(out.total_credits.checked_add(credits))?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(feature: &str, units: u64) -> UsageEvent {
        UsageEvent {
            feature_id: feature.parse().unwrap(),
            units,
            occurred_at: None,
            credits: None,
        }
    }

    #[test]
    fn groups_by_feature_and_category() {
        let catalog = Catalog::default();
        let events = [event("de", 100), event("ev", 500), event("gaif", 40), event("de", 20)];

        let agg = aggregate(&events, &catalog).unwrap();

        let de = agg.by_feature[&"de".parse::<FeatureId>().unwrap()];
        assert_eq!(de.units, 120);
        assert_eq!(de.total_credits, 1_200);
        assert_eq!(agg.by_category["Data Services"].total_credits, 1_700);
        assert_eq!(agg.by_category["AI & Modeling"].total_credits, 40);
        assert_eq!(agg.total_credits, 1_740);
    }

    #[test]
    fn order_does_not_matter() {
        let catalog = Catalog::default();
        let mut events = vec![event("dtsms", 3), event("ahm", 2), event("ev", 9), event("dtsms", 1)];

        let forward = aggregate(&events, &catalog).unwrap();
        events.reverse();
        let backward = aggregate(&events, &catalog).unwrap();

        assert_eq!(forward, backward);
    }

    #[test]
    fn unknown_features_are_skipped() {
        let catalog = Catalog::default();
        let events = [event("ev", 10), event("retired", 99)];

        let agg = aggregate(&events, &catalog).unwrap();

        assert_eq!(agg.total_credits, 10);
        assert_eq!(agg.skipped, vec!["retired".parse::<FeatureId>().unwrap()]);
    }

    #[test]
    fn recorded_credits_win_over_the_current_price() {
        let catalog = Catalog::default();
        let mut repriced = event("de", 100);
        repriced.credits = Some(500);

        let agg = aggregate(&[repriced, event("de", 10)], &catalog).unwrap();

        let de = agg.by_feature[&"de".parse::<FeatureId>().unwrap()];
        assert_eq!(de.units, 110);
        assert_eq!(de.total_credits, 600);
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let catalog = Catalog::default();
        let mut huge = event("ev", 1);
        huge.credits = Some(i64::MAX);

        assert!(matches!(
            aggregate(&[huge, event("de", 1)], &catalog),
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            aggregate(&[event("ev", u64::MAX), event("ev", 1)], &catalog),
            Err(BillingError::InvalidAmount(_))
        ));
    }
}
