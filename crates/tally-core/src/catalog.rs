//! Catalog reference data: plans, credit packs, metered features and system pricing.
//!
//! The catalog is read-only from the engine's point of view. Admin edits replace
//! the whole snapshot; a billing calculation always runs against one snapshot.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{BillingError, Result};
use crate::ids::{FeatureId, PackId, PlanId};

/// Lifecycle status shared by plans and credit packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Sold to new clients.
    Active,
    /// No longer sold; existing subscriptions keep working.
    Archived,
    /// Grandfathered pricing for existing customers.
    Legacy,
    /// Staff-only.
    Internal,
    /// Offered to selected clients.
    Beta,
}

impl LifecycleStatus {
    /// Whether the entry may be offered in upgrade or purchase recommendations.
    #[must_use]
    pub const fn is_offerable(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A subscription plan.
///
/// Pricing is the record-based schema: a monthly base price plus an optional
/// per-record monthly fee. Flat plans simply have no per-record price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id.
    pub id: PlanId,

    /// Display name (also the client's subscription tier label).
    pub name: String,

    /// Marketing description.
    #[serde(default)]
    pub description: String,

    /// Monthly base fee in dollars.
    pub monthly_price: Decimal,

    /// Monthly fee per database record, for record-based plans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_record_per_month: Option<Decimal>,

    /// Credits granted each billing period.
    #[serde(alias = "baselineCredits", alias = "baseline_credits")]
    pub monthly_credits_included: i64,

    /// Dollar cost per credit consumed beyond the allotment.
    pub overage_credit_rate: Decimal,

    /// Ordinal rank used to find the next plan up.
    pub tier_level: u32,

    /// Lifecycle status.
    pub status: LifecycleStatus,
}

impl Plan {
    /// Base fee for one period: monthly price plus the record-based fee.
    #[must_use]
    pub fn base_fee(&self, record_count: u64) -> Decimal {
        let record_fee = self
            .price_per_record_per_month
            .map_or(Decimal::ZERO, |price| price * Decimal::from(record_count));
        self.monthly_price + record_fee
    }

    /// Dollar cost of `credits` overage credits.
    #[must_use]
    pub fn overage_cost(&self, credits: Decimal) -> Decimal {
        credits.max(Decimal::ZERO) * self.overage_credit_rate
    }
}

/// A purchasable bundle of add-on credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPack {
    /// Pack id.
    pub id: PackId,

    /// Display name.
    pub name: String,

    /// Credits added to the add-on pool.
    pub credits: i64,

    /// One-time price in dollars.
    pub price: Decimal,

    /// Days until purchased credits expire; `None` means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_expiration_days: Option<u32>,

    /// Lifecycle status.
    pub status: LifecycleStatus,
}

impl CreditPack {
    /// Dollars per credit, used to rank packs by cost efficiency.
    #[must_use]
    pub fn price_per_credit(&self) -> Decimal {
        if self.credits > 0 {
            self.price / Decimal::from(self.credits)
        } else {
            Decimal::MAX
        }
    }
}

/// A metered feature with its credit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature id.
    pub id: FeatureId,

    /// Display name.
    pub name: String,

    /// Grouping used in usage breakdowns.
    pub category: String,

    /// Credits charged per unit.
    pub credit_cost: i64,

    /// Internal dollar cost per unit, for margin reporting.
    #[serde(default)]
    pub cost_per_unit: Decimal,

    /// Disabled features keep their history but accrue no new usage.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl Feature {
    /// Credits consumed by `units` units.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if the product overflows.
    pub fn credits_for(&self, units: u64) -> Result<i64> {
        i64::try_from(units)
            .ok()
            .and_then(|units| units.checked_mul(self.credit_cost))
            .ok_or_else(|| {
                BillingError::InvalidAmount(format!(
                    "{units} units of {} overflow the credit counter",
                    self.id
                ))
            })
    }

    /// Units implied by a credit amount. Zero-cost features imply zero units.
    #[must_use]
    pub fn implied_units(&self, credits: i64) -> Decimal {
        if self.credit_cost > 0 {
            Decimal::from(credits) / Decimal::from(self.credit_cost)
        } else {
            Decimal::ZERO
        }
    }
}

/// System-wide pricing constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPricing {
    /// Dollar value of one credit, for revenue and margin figures.
    pub credit_purchase_price: Decimal,
}

impl Default for SystemPricing {
    fn default() -> Self {
        Self {
            credit_purchase_price: dec!(0.02),
        }
    }
}

/// A consistent snapshot of all reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Subscription plans.
    pub plans: Vec<Plan>,

    /// Credit packs.
    pub packs: Vec<CreditPack>,

    /// Metered features.
    pub features: Vec<Feature>,

    /// System pricing constants.
    #[serde(default)]
    pub pricing: SystemPricing,
}

impl Catalog {
    /// Parse and validate a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidCatalog` if the JSON is malformed or the
    /// data violates a catalog invariant.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| BillingError::InvalidCatalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the reference-data invariants.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidCatalog` on duplicate ids, negative credit
    /// costs, negative prices or empty packs.
    pub fn validate(&self) -> Result<()> {
        fn unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    return Err(BillingError::InvalidCatalog(format!("duplicate {kind} id {id}")));
                }
            }
            Ok(())
        }

        unique("plan", self.plans.iter().map(|p| p.id.as_str()))?;
        unique("pack", self.packs.iter().map(|p| p.id.as_str()))?;
        unique("feature", self.features.iter().map(|f| f.id.as_str()))?;

        for plan in &self.plans {
            if plan.monthly_credits_included < 0
                || plan.monthly_price < Decimal::ZERO
                || plan.overage_credit_rate < Decimal::ZERO
                || plan
                    .price_per_record_per_month
                    .is_some_and(|p| p < Decimal::ZERO)
            {
                return Err(BillingError::InvalidCatalog(format!(
                    "plan {} has a negative price or allotment",
                    plan.id
                )));
            }
        }
        for pack in &self.packs {
            if pack.credits <= 0 || pack.price < Decimal::ZERO {
                return Err(BillingError::InvalidCatalog(format!(
                    "pack {} must grant credits at a non-negative price",
                    pack.id
                )));
            }
        }
        for feature in &self.features {
            if feature.credit_cost < 0 {
                return Err(BillingError::InvalidCatalog(format!(
                    "feature {} has a negative credit cost",
                    feature.id
                )));
            }
        }
        Ok(())
    }

    /// Look up a plan.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::UnknownPlan` if no plan has this id.
    pub fn plan(&self, id: &PlanId) -> Result<&Plan> {
        self.plans
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| BillingError::UnknownPlan {
                plan_id: id.to_string(),
            })
    }

    /// Look up a feature.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::UnknownFeature` if no feature has this id.
    pub fn feature(&self, id: &FeatureId) -> Result<&Feature> {
        self.find_feature(id)
            .ok_or_else(|| BillingError::UnknownFeature {
                feature_id: id.to_string(),
            })
    }

    /// Look up a feature without treating absence as an error.
    #[must_use]
    pub fn find_feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| &f.id == id)
    }

    /// Look up a credit pack.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::UnknownPack` if no pack has this id.
    pub fn pack(&self, id: &PackId) -> Result<&CreditPack> {
        self.packs
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| BillingError::UnknownPack {
                pack_id: id.to_string(),
            })
    }

    /// The smallest offerable tier strictly above `plan`. Ties keep catalog order.
    #[must_use]
    pub fn next_tier(&self, plan: &Plan) -> Option<&Plan> {
        self.plans
            .iter()
            .filter(|p| p.status.is_offerable() && p.tier_level > plan.tier_level)
            .min_by_key(|p| p.tier_level)
    }

    /// The cheapest offerable pack holding at least `credits` credits.
    #[must_use]
    pub fn cheapest_covering_pack(&self, credits: Decimal) -> Option<&CreditPack> {
        self.packs
            .iter()
            .filter(|p| p.status.is_offerable() && Decimal::from(p.credits) >= credits)
            .min_by(|a, b| {
                a.price
                    .cmp(&b.price)
                    .then_with(|| a.price_per_credit().cmp(&b.price_per_credit()))
            })
    }
}

/// Build a slug id for the built-in catalog.
fn slug<T: std::str::FromStr>(s: &str) -> T
where
    T::Err: std::fmt::Debug,
{
    // INVARIANT: only called with the non-empty, whitespace-free literals below.
    s.parse().expect("built-in catalog ids are valid slugs")
}

#[allow(clippy::too_many_arguments)]
fn plan(
    id: &str,
    name: &str,
    monthly_price: Decimal,
    per_record: Option<Decimal>,
    credits: i64,
    rate: Decimal,
    tier_level: u32,
    status: LifecycleStatus,
) -> Plan {
    Plan {
        id: slug(id),
        name: name.into(),
        description: String::new(),
        monthly_price,
        price_per_record_per_month: per_record,
        monthly_credits_included: credits,
        overage_credit_rate: rate,
        tier_level,
        status,
    }
}

fn pack(id: &str, name: &str, credits: i64, price: Decimal, status: LifecycleStatus) -> CreditPack {
    CreditPack {
        id: slug(id),
        name: name.into(),
        credits,
        price,
        credit_expiration_days: None,
        status,
    }
}

fn feature(id: &str, name: &str, category: &str, credit_cost: i64, cost: Decimal, enabled: bool) -> Feature {
    Feature {
        id: slug(id),
        name: name.into(),
        category: category.into(),
        credit_cost,
        cost_per_unit: cost,
        enabled,
    }
}

impl Default for Catalog {
    fn default() -> Self {
        use LifecycleStatus::{Active, Archived, Beta, Internal};

        Self {
            plans: vec![
                plan("starter", "Starter", dec!(0), None, 5_000, dec!(0.020), 1, Active),
                plan("professional", "Professional", dec!(0), Some(dec!(0.005)), 15_000, dec!(0.020), 2, Active),
                plan("enterprise", "Enterprise", dec!(0), Some(dec!(0.0075)), 50_000, dec!(0.020), 3, Active),
                plan("legacy-standard", "Legacy Standard", dec!(79), None, 7_500, dec!(0.020), 1, Archived),
                plan("internal-test", "Internal Test", dec!(0), None, 999_999, dec!(0), 99, Internal),
                plan("beta-growth", "Beta Growth", dec!(99), None, 15_000, dec!(0.018), 2, Beta),
            ],
            packs: vec![
                pack("pack1", "Small Boost", 2_500, dec!(25), Active),
                pack("pack2", "Medium Boost", 6_000, dec!(50), Active),
                pack("pack3", "Large Boost", 13_000, dec!(100), Active),
                pack("pack4", "Legacy Boost", 1_000, dec!(15), Archived),
            ],
            features: vec![
                feature("de", "Data Enhancement", "Data Services", 10, dec!(0.05), true),
                feature("ev", "Email Verification", "Data Services", 1, dec!(0.002), true),
                feature("appends", "Appends", "Data Services", 10, dec!(0.08), true),
                feature("eappend", "Email Append", "Data Services", 2, dec!(0.01), true),
                feature("gaif", "General AI Features", "AI & Modeling", 1, dec!(0.005), true),
                feature("ahm", "Ad Hoc Model Run", "AI & Modeling", 30, dec!(0.15), true),
                feature("dmp", "Donor Marketplace", "AI & Modeling", 75, dec!(0), false),
                feature("dtpc", "DialR - Twilio Phone Call", "DialR Communications", 5, dec!(0.04), true),
                feature("dtsms", "DialR - Twilio SMS", "DialR Communications", 10, dec!(0.07), true),
            ],
            pricing: SystemPricing::default(),
        }
    }
}
