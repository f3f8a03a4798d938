//! Credit ledger and billing engine for tally.
//!
//! This crate is the pure, synchronous core of the billing system:
//!
//! - **Catalog**: `Catalog`, `Plan`, `CreditPack`, `Feature`, `SystemPricing`
//! - **Clients**: `Client`, `ClientUsage`, `Discount`
//! - **Credits**: `CreditBalance`, `CreditTransaction`, `TransactionType`
//! - **Ledger**: `Ledger`, the only mutation point for a client
//! - **Usage**: `UsageEvent`, `aggregate`
//! - **Billing**: `compute_summary`, `BillingSummary`
//! - **Forecasting**: `forecast`, `Recommendation`
//! - **Reporting**: `export_statement`, `portfolio::overview`
//!
//! # Credits and money
//!
//! Credits are whole numbers stored as `i64`. Dollar figures (prices, overage
//! rates, bills) are `rust_decimal::Decimal` and summaries round them to cents.
//!
//! # Credit pools
//!
//! Usage draws `monthly` first, then `rollover`, then `add_on`. Pools never go
//! negative; the shortfall is billed as overage.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod billing;
pub mod catalog;
pub mod client;
pub mod credits;
pub mod error;
pub mod forecast;
pub mod ids;
pub mod ledger;
pub mod period;
pub mod policy;
pub mod portfolio;
pub mod statement;
pub mod usage;

pub use billing::{
    compute_summary, open_period_charges, AppliedDiscount, BillingSummary, CategoryBreakdown,
    FeatureBreakdown, PeriodCharges,
};
pub use catalog::{Catalog, CreditPack, Feature, LifecycleStatus, Plan, SystemPricing};
pub use client::{
    Client, ClientStatus, ClientUsage, Discount, DiscountKind, FeatureUsage, OneTimeCharge,
};
pub use credits::{CreditBalance, CreditTransaction, Draw, TransactionType};
pub use error::{BillingError, Result};
pub use forecast::{forecast, Forecast, Recommendation};
pub use ids::{ClientId, DiscountId, FeatureId, IdError, PackId, PlanId, TransactionId};
pub use ledger::Ledger;
pub use period::{BillingPeriod, PeriodSelector};
pub use policy::BillingPolicy;
pub use portfolio::{AlertKind, PortfolioOverview, UsageAlert};
pub use statement::{export_statement, Statement};
pub use usage::{aggregate, UsageAggregate, UsageEvent};
