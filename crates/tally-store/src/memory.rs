//! In-memory storage implementation.
//!
//! Clients live in a `DashMap` of per-client mutexes; the catalog behind a
//! `RwLock` holding an `Arc` snapshot.
//!
//! Ledger operations validate before they mutate, so they run directly on the
//! locked client. Period close runs on a copy and commits only once the closed
//! ledger audits clean.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use tally_core::{
    BillingPeriod, BillingPolicy, Catalog, Client, ClientId, ClientUsage,
    CreditTransaction, Discount, FeatureId, Ledger, PackId, PlanId,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// In-memory storage backend.
pub struct MemoryStore {
    catalog: RwLock<Arc<Catalog>>,
    clients: DashMap<ClientId, Arc<Mutex<Client>>>,
    processed_events: DashMap<ClientId, SeenEvents>,
}

/// Usage event ids accepted for one client.
///
/// Ids are kept for the open period and the one closed before it, so a retry
/// straddling a close is still caught. Older ids are dropped.
#[derive(Debug, Default)]
struct SeenEvents {
    open: HashSet<String>,
    closed: HashSet<String>,
}

impl SeenEvents {
    fn contains(&self, event_id: &str) -> bool {
        self.open.contains(event_id) || self.closed.contains(event_id)
    }

    fn rotate(&mut self) {
        self.closed = std::mem::take(&mut self.open);
    }
}

impl MemoryStore {
    /// Create an empty store over `catalog`.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            clients: DashMap::new(),
            processed_events: DashMap::new(),
        }
    }

    /// Read and validate a JSON catalog file.
    ///
    /// # Errors
    ///
    /// - `StoreError::Catalog` if the file cannot be read.
    /// - `StoreError::Billing` if its contents are not a valid catalog.
    pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Catalog(format!("{}: {e}", path.display())))?;
        let catalog = Catalog::from_json(&json)?;
        info!(
            path = %path.display(),
            plans = catalog.plans.len(),
            features = catalog.features.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn entry(&self, client_id: &ClientId) -> Result<Arc<Mutex<Client>>> {
        self.clients
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::client_not_found(client_id))
    }

    /// Run a ledger operation on the locked client.
    fn mutate<T, F>(&self, client_id: &ClientId, op: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger<'_>, &Catalog) -> tally_core::Result<T>,
    {
        let catalog = self.catalog();
        let entry = self.entry(client_id)?;
        let mut guard = entry.lock();

        Ok(op(&mut Ledger::new(&mut guard), &catalog)?)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Catalog::default())
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    fn replace_catalog(&self, catalog: Catalog) -> Result<Arc<Catalog>> {
        catalog.validate()?;
        let snapshot = Arc::new(catalog);
        *self.catalog.write() = Arc::clone(&snapshot);
        info!(
            plans = snapshot.plans.len(),
            packs = snapshot.packs.len(),
            features = snapshot.features.len(),
            "Catalog replaced"
        );
        Ok(snapshot)
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    fn create_client(&self, mut client: Client, at: DateTime<Utc>) -> Result<Client> {
        let catalog = self.catalog();
        let plan = catalog.plan(&client.plan_id)?;
        Ledger::new(&mut client).allocate_monthly_credits(plan, plan.monthly_credits_included, at)?;

        match self.clients.entry(client.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                entity: "client",
                id: client.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(client.clone())));
                info!(client_id = %client.id, plan_id = %client.plan_id, "Client created");
                Ok(client)
            }
        }
    }

    fn get_client(&self, client_id: &ClientId) -> Result<Client> {
        let entry = self.entry(client_id)?;
        let client = entry.lock().clone();
        Ok(client)
    }

    fn list_clients(&self) -> Vec<Client> {
        let entries: Vec<_> = self
            .clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut clients: Vec<_> = entries.iter().map(|c| c.lock().clone()).collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        clients
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn record_usage(
        &self,
        client_id: &ClientId,
        feature_id: &FeatureId,
        units: u64,
        at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<CreditTransaction> {
        let catalog = self.catalog();
        let entry = self.entry(client_id)?;
        let mut guard = entry.lock();

        if let Some(event_id) = event_id {
            let seen = self
                .processed_events
                .get(client_id)
                .is_some_and(|events| events.contains(event_id));
            if seen {
                debug!(client_id = %client_id, event_id, "Duplicate usage event");
                return Err(StoreError::DuplicateEvent {
                    event_id: event_id.to_string(),
                });
            }
        }

        let tx = Ledger::new(&mut guard).record_usage(&catalog, feature_id, units, at)?;
        if let Some(event_id) = event_id {
            self.processed_events
                .entry(*client_id)
                .or_default()
                .open
                .insert(event_id.to_string());
        }
        Ok(tx)
    }

    fn purchase_credit_pack(
        &self,
        client_id: &ClientId,
        pack_id: &PackId,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        self.mutate(client_id, |ledger, catalog| {
            ledger.purchase_credit_pack(catalog, pack_id, at)
        })
    }

    fn add_free_credits(
        &self,
        client_id: &ClientId,
        amount: i64,
        expires_on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        self.mutate(client_id, |ledger, _| {
            ledger.add_free_credits(amount, expires_on, at)
        })
    }

    fn add_discount(
        &self,
        client_id: &ClientId,
        period: BillingPeriod,
        discount: Discount,
    ) -> Result<()> {
        self.mutate(client_id, |ledger, _| ledger.add_discount(period, discount))
    }

    fn change_subscription(
        &self,
        client_id: &ClientId,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        self.mutate(client_id, |ledger, catalog| {
            ledger.change_subscription(catalog, plan_id, at)
        })
    }

    fn adjust_credits(
        &self,
        client_id: &ClientId,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        self.mutate(client_id, |ledger, _| ledger.adjust_credits(amount, reason, at))
    }

    fn close_period(
        &self,
        client_id: &ClientId,
        policy: &BillingPolicy,
        at: DateTime<Utc>,
    ) -> Result<ClientUsage> {
        let catalog = self.catalog();
        let entry = self.entry(client_id)?;
        let mut guard = entry.lock();

        let mut draft = guard.clone();
        let frozen = Ledger::new(&mut draft).close_period(&catalog, policy, at)?;
        Ledger::audit(&draft).map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Ledger audit failed at period close");
            e
        })?;
        *guard = draft;

        if let Some(mut events) = self.processed_events.get_mut(client_id) {
            events.rotate();
        }
        Ok(frozen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tally_core::{BillingError, DiscountKind};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, 10, 0, 0).unwrap()
    }

    fn create(store: &MemoryStore, name: &str, plan: &str) -> Client {
        let client = Client::new(ClientId::generate(), name, "db", plan.parse().unwrap(), at(1));
        store.create_client(client, at(1)).unwrap()
    }

    #[test]
    fn create_client_allocates_first_allotment() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "professional");

        assert_eq!(client.balance.monthly, 15_000);
        assert_eq!(client.transactions.len(), 1);

        let fetched = store.get_client(&client.id).unwrap();
        assert_eq!(fetched.balance, client.balance);

        let duplicate = store.create_client(fetched, at(1));
        assert!(matches!(duplicate, Err(StoreError::AlreadyExists { .. })));
    }

    #[test]
    fn unknown_plan_and_client() {
        let store = MemoryStore::default();
        let client = Client::new(ClientId::generate(), "X", "db", "platinum".parse().unwrap(), at(1));
        assert!(matches!(
            store.create_client(client, at(1)),
            Err(StoreError::Billing(BillingError::UnknownPlan { .. }))
        ));
        assert!(matches!(
            store.get_client(&ClientId::generate()),
            Err(StoreError::NotFound { entity: "client", .. })
        ));
    }

    #[test]
    fn failed_mutation_leaves_client_untouched() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "starter");

        let err = store
            .add_free_credits(&client.id, -1, at(2).date_naive() + Duration::days(5), at(2))
            .unwrap_err();
        assert!(matches!(err, StoreError::Billing(BillingError::InvalidAmount(_))));

        let after = store.get_client(&client.id).unwrap();
        assert_eq!(after.balance, client.balance);
        assert_eq!(after.transactions, client.transactions);
    }

    #[test]
    fn duplicate_usage_events_are_rejected() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "starter");
        let ev: FeatureId = "ev".parse().unwrap();

        store.record_usage(&client.id, &ev, 10, at(2), Some("evt-1")).unwrap();
        assert!(matches!(
            store.record_usage(&client.id, &ev, 10, at(2), Some("evt-1")),
            Err(StoreError::DuplicateEvent { .. })
        ));
        store.record_usage(&client.id, &ev, 10, at(2), None).unwrap();
        store.record_usage(&client.id, &ev, 10, at(2), None).unwrap();

        assert_eq!(store.get_client(&client.id).unwrap().balance.monthly, 4_970);
    }

    #[test]
    fn rejected_usage_does_not_consume_the_event_id() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "starter");

        assert!(store
            .record_usage(&client.id, &"dmp".parse().unwrap(), 1, at(2), Some("evt-9"))
            .is_err());
        store
            .record_usage(&client.id, &"ev".parse().unwrap(), 1, at(2), Some("evt-9"))
            .unwrap();
    }

    #[test]
    fn usage_outside_the_open_period_leaves_client_untouched() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "starter");
        let august = Utc.with_ymd_and_hms(2024, 8, 5, 10, 0, 0).unwrap();

        assert!(matches!(
            store.record_usage(&client.id, &"de".parse().unwrap(), 400, august, Some("evt-3")),
            Err(StoreError::Billing(BillingError::InvalidPeriod(_)))
        ));

        let after = store.get_client(&client.id).unwrap();
        assert_eq!(after.balance, client.balance);
        assert_eq!(after.transactions, client.transactions);
        assert_eq!(after.current_usage, client.current_usage);
        assert!(store.processed_events.get(&client.id).is_none());
    }

    #[test]
    fn event_ids_are_kept_for_one_closed_period() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "starter");
        let ev: FeatureId = "ev".parse().unwrap();
        let policy = BillingPolicy::default();
        let first_of = |month| Utc.with_ymd_and_hms(2024, month, 1, 0, 0, 0).unwrap();
        let second_of = |month| Utc.with_ymd_and_hms(2024, month, 2, 10, 0, 0).unwrap();

        store.record_usage(&client.id, &ev, 1, at(2), Some("evt-1")).unwrap();
        store.close_period(&client.id, &policy, first_of(8)).unwrap();
        assert!(matches!(
            store.record_usage(&client.id, &ev, 1, second_of(8), Some("evt-1")),
            Err(StoreError::DuplicateEvent { .. })
        ));
        store.record_usage(&client.id, &ev, 1, second_of(8), Some("evt-2")).unwrap();

        store.close_period(&client.id, &policy, first_of(9)).unwrap();
        {
            let events = store.processed_events.get(&client.id).unwrap();
            assert!(!events.contains("evt-1"));
            assert!(events.contains("evt-2"));
        }
        store.record_usage(&client.id, &ev, 1, second_of(9), Some("evt-1")).unwrap();
    }

    #[test]
    fn concurrent_usage_for_one_client_is_serialized() {
        let store = Arc::new(MemoryStore::default());
        let client = create(&store, "Hope", "enterprise");
        let ev: FeatureId = "ev".parse().unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        store.record_usage(&client.id, &ev, 3, at(2), None).unwrap();
                    }
                });
            }
        });

        let after = store.get_client(&client.id).unwrap();
        assert_eq!(after.current_usage.total_credits_used, 1_200);
        assert_eq!(after.balance.monthly, 50_000 - 1_200);
        assert_eq!(after.transactions.len(), 401);
        Ledger::audit(&after).unwrap();
    }

    #[test]
    fn catalog_replacement_is_validated() {
        let store = MemoryStore::default();
        let before = store.catalog();

        let mut broken = Catalog::default();
        broken.packs[0].credits = 0;
        assert!(store.replace_catalog(broken).is_err());
        assert!(Arc::ptr_eq(&before, &store.catalog()));

        let mut cheaper = Catalog::default();
        cheaper.pricing.credit_purchase_price = dec!(0.015);
        store.replace_catalog(cheaper).unwrap();
        assert_eq!(store.catalog().pricing.credit_purchase_price, dec!(0.015));
        // Snapshots taken earlier are unchanged.
        assert_eq!(before.pricing.credit_purchase_price, dec!(0.02));
    }

    #[test]
    fn close_period_commits_history() {
        let store = MemoryStore::default();
        let client = create(&store, "Hope", "starter");
        let period = client.current_period();
        store
            .add_discount(
                &client.id,
                period,
                Discount::new("Welcome", DiscountKind::Fixed, dec!(5), false).unwrap(),
            )
            .unwrap();

        let frozen = store
            .close_period(&client.id, &BillingPolicy::default(), Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap())
            .unwrap();

        assert_eq!(frozen.period, period);
        let after = store.get_client(&client.id).unwrap();
        assert!(after.history.contains_key(&period));
        assert_eq!(after.balance.rollover, 1_000);
        assert!(after.current_usage.discounts.is_empty());
    }

    #[test]
    fn list_clients_orders_by_name() {
        let store = MemoryStore::default();
        create(&store, "Zephyr Trust", "starter");
        create(&store, "Acorn Fund", "starter");

        let names: Vec<_> = store.list_clients().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["Acorn Fund", "Zephyr Trust"]);
        assert_eq!(store.client_count(), 2);
    }

    #[test]
    fn load_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string_pretty(&Catalog::default()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let catalog = MemoryStore::load_catalog(file.path()).unwrap();
        assert_eq!(catalog, Catalog::default());

        assert!(matches!(
            MemoryStore::load_catalog("/nonexistent/catalog.json"),
            Err(StoreError::Catalog(_))
        ));
    }
}
