//! Client and catalog repository for tally.
//!
//! The store owns every client aggregate and the current catalog snapshot.
//! Reads of the catalog hand out an `Arc<Catalog>`, so a calculation keeps one
//! consistent snapshot even if an admin replaces the catalog meanwhile. Client
//! mutations go through the ledger under a per-client lock and are committed
//! only if the ledger accepts them.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use tally_core::{Client, ClientId};
//! use tally_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new(tally_core::Catalog::default());
//! let client = Client::new(ClientId::generate(), "Hope", "hope_db", "starter".parse().unwrap(), Utc::now());
//! let client = store.create_client(client, Utc::now()).unwrap();
//! assert_eq!(client.credits_remaining(), 5_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tally_core::{
    BillingPeriod, BillingPolicy, Catalog, Client, ClientId, ClientUsage, CreditTransaction,
    Discount, FeatureId, PackId, PlanId,
};

/// The storage trait defining all repository operations.
///
/// Ledger operations are compound: lookup, mutation and commit happen under
/// the client's lock, so concurrent calls for one client are serialized and
/// calls for different clients run in parallel.
pub trait Store: Send + Sync {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// The current catalog snapshot.
    fn catalog(&self) -> Arc<Catalog>;

    /// Replace the catalog atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Billing` with `InvalidCatalog` if the catalog fails
    /// validation; the previous snapshot stays in place.
    fn replace_catalog(&self, catalog: Catalog) -> Result<Arc<Catalog>>;

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Register a client and allocate its first monthly allotment.
    ///
    /// # Errors
    ///
    /// - `StoreError::AlreadyExists` if the id is taken.
    /// - `StoreError::Billing` if the client's plan is not in the catalog.
    fn create_client(&self, client: Client, at: DateTime<Utc>) -> Result<Client>;

    /// A consistent copy of one client.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the client doesn't exist.
    fn get_client(&self, client_id: &ClientId) -> Result<Client>;

    /// Copies of all clients, ordered by name.
    fn list_clients(&self) -> Vec<Client>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Record feature usage.
    ///
    /// When `event_id` is given, a second report with the same id for the same
    /// client is rejected.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::DuplicateEvent` if the event was already processed.
    /// - `StoreError::Billing` if the ledger rejects the usage.
    fn record_usage(
        &self,
        client_id: &ClientId,
        feature_id: &FeatureId,
        units: u64,
        at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<CreditTransaction>;

    /// Buy a credit pack.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::Billing` if the pack is unknown.
    fn purchase_credit_pack(
        &self,
        client_id: &ClientId,
        pack_id: &PackId,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction>;

    /// Grant free credits.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::Billing` on a non-positive amount or past expiration.
    fn add_free_credits(
        &self,
        client_id: &ClientId,
        amount: i64,
        expires_on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction>;

    /// Attach a discount to the open period.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::Billing` if the discount or period is rejected.
    fn add_discount(
        &self,
        client_id: &ClientId,
        period: BillingPeriod,
        discount: Discount,
    ) -> Result<()>;

    /// Change the client's plan.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::Billing` if the plan is unknown.
    fn change_subscription(
        &self,
        client_id: &ClientId,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction>;

    /// Manually adjust the balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::Billing` on a zero amount or an overdraw.
    fn adjust_credits(
        &self,
        client_id: &ClientId,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction>;

    /// Close the open period and start the next one.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the client doesn't exist.
    /// - `StoreError::Billing` if the client's plan is unknown.
    fn close_period(
        &self,
        client_id: &ClientId,
        policy: &BillingPolicy,
        at: DateTime<Utc>,
    ) -> Result<ClientUsage>;
}
