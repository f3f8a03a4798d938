//! The credit ledger.
//!
//! [`Ledger`] is the only code that mutates a [`Client`]'s pools, transaction
//! log and usage snapshots. Every operation validates its input before touching
//! state, and every balance change appends exactly one transaction whose
//! `balance_after` is the new pool total.
//!
//! Pools are drawn in priority order monthly, rollover, add-on. They are
//! floored at zero; the part of a debit no pool covers is recorded on the
//! transaction as `uncovered_credits` and billed as overage by the calculator.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::billing::open_period_charges;
use crate::catalog::{Catalog, Plan};
use crate::client::{Client, ClientUsage, Discount, OneTimeCharge};
use crate::credits::CreditTransaction;
use crate::error::{BillingError, Result};
use crate::ids::{FeatureId, PackId, PlanId};
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;

/// Mutation handle over one client.
#[derive(Debug)]
pub struct Ledger<'a> {
    client: &'a mut Client,
}

impl<'a> Ledger<'a> {
    /// Open the ledger of `client`.
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    /// The client behind this ledger.
    #[must_use]
    pub fn client(&self) -> &Client {
        self.client
    }

    fn append(&mut self, tx: CreditTransaction) -> CreditTransaction {
        self.client.updated_at = tx.occurred_at;
        self.client.transactions.push(tx.clone());
        tx
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Add a plan allotment to the monthly pool.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if `amount` is negative.
    pub fn allocate_monthly_credits(
        &mut self,
        plan: &Plan,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        if amount < 0 {
            return Err(BillingError::InvalidAmount(format!(
                "monthly allotment must not be negative, got {amount}"
            )));
        }

        self.client.balance.monthly += amount;
        let tx = CreditTransaction::monthly_allotment(
            self.client.id,
            amount,
            self.client.balance.total(),
            &plan.name,
            at,
        );

        info!(client_id = %self.client.id, plan_id = %plan.id, credits = amount, "Monthly credits allocated");
        Ok(self.append(tx))
    }

    /// Buy a credit pack: credits go to the add-on pool and the price is
    /// charged once on the open period.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::UnknownPack` if the pack is not in the catalog.
    pub fn purchase_credit_pack(
        &mut self,
        catalog: &Catalog,
        pack_id: &PackId,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        let pack = catalog.pack(pack_id)?;

        self.client.balance.add_on += pack.credits;
        let usage = &mut self.client.current_usage;
        usage.add_ons.push(pack.id.clone());
        usage.one_time_charges.push(OneTimeCharge {
            description: pack.name.clone(),
            amount: pack.price,
            pack_id: Some(pack.id.clone()),
        });

        let tx = CreditTransaction::add_on_purchase(
            self.client.id,
            pack,
            self.client.balance.total(),
            at,
        );

        info!(
            client_id = %self.client.id,
            pack_id = %pack.id,
            credits = pack.credits,
            price = %pack.price,
            "Credit pack purchased"
        );
        Ok(self.append(tx))
    }

    /// Grant complimentary credits to the add-on pool.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if `amount` is not positive, or
    /// `BillingError::InvalidExpiration` if `expires_on` is not after the day
    /// of `at`.
    pub fn add_free_credits(
        &mut self,
        amount: i64,
        expires_on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        if amount <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "free credits must be positive, got {amount}"
            )));
        }
        let today = at.date_naive();
        if expires_on <= today {
            return Err(BillingError::InvalidExpiration {
                expiration: expires_on,
                today,
            });
        }

        self.client.balance.add_on += amount;
        let tx = CreditTransaction::free_credits(
            self.client.id,
            amount,
            self.client.balance.total(),
            expires_on,
            at,
        );

        info!(client_id = %self.client.id, credits = amount, %expires_on, "Free credits added");
        Ok(self.append(tx))
    }

    // ========================================================================
    // Usage
    // ========================================================================

    /// Record feature usage and draw its credits from the pools.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidAmount` if `units` is zero or the credit cost or
    ///   the period totals overflow
    /// - `BillingError::UnknownFeature` if the feature is not in the catalog
    /// - `BillingError::FeatureDisabled` if the feature is switched off
    /// - `BillingError::InvalidPeriod` if `at` falls outside the open period
    pub fn record_usage(
        &mut self,
        catalog: &Catalog,
        feature_id: &FeatureId,
        units: u64,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        if units == 0 {
            return Err(BillingError::InvalidAmount("units must be positive".into()));
        }
        let feature = catalog.feature(feature_id)?;
        if !feature.enabled {
            return Err(BillingError::FeatureDisabled {
                feature_id: feature_id.to_string(),
            });
        }
        let day = at.date_naive();
        let period = self.client.current_period();
        if !period.contains(day) {
            return Err(BillingError::InvalidPeriod(format!(
                "usage dated {day} falls outside the open period {period}"
            )));
        }
        let credits = feature.credits_for(units)?;

        self.client.current_usage.record(&feature.id, units, credits)?;
        let draw = self.client.balance.draw(credits);

        let tx = CreditTransaction::usage(
            self.client.id,
            feature,
            units,
            credits,
            draw,
            self.client.balance.total(),
            at,
        );

        info!(
            client_id = %self.client.id,
            feature_id = %feature.id,
            units,
            credits,
            uncovered = draw.uncovered,
            "Usage recorded"
        );
        Ok(self.append(tx))
    }

    /// Correct the balance by hand.
    ///
    /// Positive amounts go to the add-on pool; negative amounts draw the pools
    /// in priority order.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` for a zero amount, or
    /// `BillingError::InsufficientCredits` if the total would go negative.
    pub fn adjust_credits(
        &mut self,
        amount: i64,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount("adjustment must not be zero".into()));
        }

        let balance = self.client.balance.total();
        if amount > 0 {
            self.client.balance.add_on += amount;
        } else {
            let required = amount.saturating_neg();
            if required > balance {
                return Err(BillingError::InsufficientCredits { balance, required });
            }
            self.client.balance.draw(required);
        }

        let tx = CreditTransaction::adjustment(
            self.client.id,
            amount,
            self.client.balance.total(),
            reason.into(),
            at,
        );

        info!(client_id = %self.client.id, credits = amount, "Credits adjusted");
        Ok(self.append(tx))
    }

    // ========================================================================
    // Billing terms
    // ========================================================================

    /// Attach a discount to the open period.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidDiscount` if the discount is malformed
    /// - `BillingError::InvalidPeriod` if `period` is already closed
    /// - `BillingError::PeriodNotFound` if `period` is neither open nor closed
    pub fn add_discount(&mut self, period: BillingPeriod, discount: Discount) -> Result<()> {
        discount.validate()?;
        if period != self.client.current_period() {
            if self.client.history.contains_key(&period) {
                return Err(BillingError::InvalidPeriod(format!(
                    "{period} is closed and its bill is final"
                )));
            }
            return Err(BillingError::PeriodNotFound {
                period: period.to_string(),
            });
        }

        info!(
            client_id = %self.client.id,
            discount_id = %discount.id,
            %period,
            "Discount added"
        );
        self.client.current_usage.discounts.push(discount);
        Ok(())
    }

    /// Switch plans. Moves no credits; the new allotment arrives at the next
    /// period close.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::UnknownPlan` if the new plan is not in the catalog.
    pub fn change_subscription(
        &mut self,
        catalog: &Catalog,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        let new_plan = catalog.plan(plan_id)?;
        let old_name = catalog
            .plan(&self.client.plan_id)
            .map_or_else(|_| self.client.plan_id.to_string(), |p| p.name.clone());

        self.client.plan_id = new_plan.id.clone();
        let tx = CreditTransaction::subscription_change(
            self.client.id,
            &old_name,
            &new_plan.name,
            self.client.balance.total(),
            at,
        );

        info!(client_id = %self.client.id, from = %old_name, to = %new_plan.name, "Subscription changed");
        Ok(self.append(tx))
    }

    /// Close the open period.
    ///
    /// Freezes the usage snapshot with its final bill, carries up to the
    /// policy's share of the allotment into rollover, expires the rest of the
    /// monthly pool and the previous rollover, opens the next period with the
    /// recurring discounts, and allocates the plan's allotment. Returns the
    /// frozen snapshot.
    ///
    /// # Errors
    ///
    /// - `BillingError::UnknownPlan` if the client's plan is not in the catalog
    /// - `BillingError::InvalidAmount` if the period's usage totals overflow
    pub fn close_period(
        &mut self,
        catalog: &Catalog,
        policy: &BillingPolicy,
        at: DateTime<Utc>,
    ) -> Result<ClientUsage> {
        let plan = catalog.plan(&self.client.plan_id)?;
        let closing = self.client.current_period();
        let next = closing.next();

        let charges = open_period_charges(self.client, catalog)?;
        let mut frozen = self.client.current_usage.clone();
        frozen.plan_id = Some(plan.id.clone());
        frozen.total_credits_used = charges.credits_used;
        frozen.total_bill = charges.total_bill;

        let balance = &mut self.client.balance;
        let carried = balance.monthly.min(policy.rollover_cap(plan.monthly_credits_included));
        let expired = balance.monthly + balance.rollover - carried;
        balance.monthly = 0;
        balance.rollover = carried;

        if expired > 0 {
            let tx = CreditTransaction::adjustment(
                self.client.id,
                -expired,
                self.client.balance.total(),
                format!("Expired {expired} unused credits at close of {closing}"),
                at,
            );
            self.append(tx);
        }

        let mut opened = ClientUsage::new(next);
        opened.discounts = frozen
            .discounts
            .iter()
            .filter(|d| d.recurring)
            .cloned()
            .collect();

        self.client.history.insert(closing, frozen.clone());
        self.client.current_usage = opened;
        self.client.billing_period_start = next.first_day();

        info!(
            client_id = %self.client.id,
            period = %closing,
            total_bill = %frozen.total_bill,
            rollover = carried,
            expired,
            "Billing period closed"
        );

        self.allocate_monthly_credits(plan, plan.monthly_credits_included, at)?;
        Ok(frozen)
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Replay the transaction log against its snapshots.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::LedgerInconsistent` at the first entry whose
    /// `balance_after` does not follow from its predecessor, or if the last
    /// snapshot differs from the pools.
    pub fn audit(client: &Client) -> Result<()> {
        let mut running = 0_i64;
        for tx in &client.transactions {
            let expected = running + tx.amount + tx.uncovered_credits;
            if tx.balance_after != expected {
                return Err(BillingError::LedgerInconsistent {
                    transaction_id: tx.id.to_string(),
                    reason: format!(
                        "balance_after {} but replay gives {expected}",
                        tx.balance_after
                    ),
                });
            }
            if tx.balance_after < 0 {
                return Err(BillingError::LedgerInconsistent {
                    transaction_id: tx.id.to_string(),
                    reason: format!("negative balance {}", tx.balance_after),
                });
            }
            running = tx.balance_after;
        }

        if let Some(last) = client.transactions.last() {
            if running != client.balance.total() {
                return Err(BillingError::LedgerInconsistent {
                    transaction_id: last.id.to_string(),
                    reason: format!(
                        "pools total {} but log ends at {running}",
                        client.balance.total()
                    ),
                });
            }
        }
        Ok(())
    }
}
