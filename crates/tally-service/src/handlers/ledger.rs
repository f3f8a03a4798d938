//! Credit ledger handlers: usage, packs, free credits, discounts, plan
//! changes, adjustments and period close.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{
    BillingPeriod, ClientUsage, CreditTransaction, Discount, DiscountKind, FeatureId, PackId,
    PlanId,
};
use tally_store::Store;

use super::parse_client_id;
use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// A ledger entry and the balance it left behind.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// The appended transaction.
    pub transaction: CreditTransaction,
    /// Total credits remaining after it.
    pub credits_remaining: i64,
}

impl From<CreditTransaction> for LedgerResponse {
    fn from(transaction: CreditTransaction) -> Self {
        Self {
            credits_remaining: transaction.balance_after,
            transaction,
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<CreditTransaction>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List a client's transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(client_id): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let client = state.store.get_client(&client_id)?;

    let limit = query.limit.min(500);
    // Entries are appended in order, so ties on `occurred_at` keep the later one first.
    let mut transactions = client.transactions;
    transactions.reverse();
    transactions.sort_by_key(|tx| std::cmp::Reverse(tx.occurred_at));

    let has_more = transactions.len() > query.offset.saturating_add(limit);
    let transactions = transactions
        .into_iter()
        .skip(query.offset)
        .take(limit)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

// ============================================================================
// Usage
// ============================================================================

/// Usage report from a metered service.
#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// Unique event ID for idempotency.
    #[serde(default)]
    pub event_id: Option<String>,
    /// Feature consumed.
    pub feature_id: FeatureId,
    /// Units consumed.
    pub units: u64,
    /// When the usage happened (default: now).
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Record feature usage.
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(client_id): Path<String>,
    Json(body): Json<UsageRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;

    tracing::debug!(
        service = %auth.service_name,
        client_id = %client_id,
        feature_id = %body.feature_id,
        units = body.units,
        event_id = ?body.event_id,
        "Processing usage event"
    );

    let tx = state.store.record_usage(
        &client_id,
        &body.feature_id,
        body.units,
        body.occurred_at.unwrap_or_else(Utc::now),
        body.event_id.as_deref(),
    )?;

    Ok(Json(tx.into()))
}

// ============================================================================
// Credits
// ============================================================================

/// Credit pack purchase request.
#[derive(Debug, Deserialize)]
pub struct PurchasePackRequest {
    /// Pack to buy.
    pub pack_id: PackId,
}

/// Buy a credit pack.
pub async fn purchase_credit_pack(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(client_id): Path<String>,
    Json(body): Json<PurchasePackRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let tx = state
        .store
        .purchase_credit_pack(&client_id, &body.pack_id, Utc::now())?;
    Ok(Json(tx.into()))
}

/// Free credits request.
#[derive(Debug, Deserialize)]
pub struct FreeCreditsRequest {
    /// Credits to grant.
    pub amount: i64,
    /// Expiration date, strictly in the future.
    pub expires_on: NaiveDate,
}

/// Grant free credits.
pub async fn add_free_credits(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(client_id): Path<String>,
    Json(body): Json<FreeCreditsRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let tx = state
        .store
        .add_free_credits(&client_id, body.amount, body.expires_on, Utc::now())?;

    tracing::info!(
        admin_id = %auth.admin_id,
        client_id = %client_id,
        amount = body.amount,
        "Free credits granted"
    );

    Ok(Json(tx.into()))
}

/// Manual adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    /// Signed credits.
    pub amount: i64,
    /// Reason recorded on the transaction.
    pub reason: String,
}

/// Manually adjust a client's balance.
pub async fn adjust_credits(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(client_id): Path<String>,
    Json(body): Json<AdjustmentRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    if body.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("Adjustment reason is required".into()));
    }

    let tx = state
        .store
        .adjust_credits(&client_id, body.amount, &body.reason, Utc::now())?;

    tracing::info!(
        admin_id = %auth.admin_id,
        client_id = %client_id,
        amount = body.amount,
        "Credits adjusted"
    );

    Ok(Json(tx.into()))
}

// ============================================================================
// Discounts and subscription
// ============================================================================

/// Discount request.
#[derive(Debug, Deserialize)]
pub struct DiscountRequest {
    /// Statement line.
    pub description: String,
    /// Fixed or percentage.
    pub kind: DiscountKind,
    /// Dollars or percent.
    pub value: Decimal,
    /// Carry into later periods.
    #[serde(default)]
    pub recurring: bool,
    /// Target period (default: the open one).
    #[serde(default)]
    pub period: Option<BillingPeriod>,
}

/// Attach a discount to the open period.
pub async fn add_discount(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(client_id): Path<String>,
    Json(body): Json<DiscountRequest>,
) -> Result<(StatusCode, Json<Discount>), ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let discount = Discount::new(body.description, body.kind, body.value, body.recurring)?;

    let period = match body.period {
        Some(period) => period,
        None => state.store.get_client(&client_id)?.current_period(),
    };
    state
        .store
        .add_discount(&client_id, period, discount.clone())?;

    Ok((StatusCode::CREATED, Json(discount)))
}

/// Plan change request.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    /// New plan.
    pub plan_id: PlanId,
}

/// Move a client to another plan.
pub async fn change_subscription(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(client_id): Path<String>,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let tx = state
        .store
        .change_subscription(&client_id, &body.plan_id, Utc::now())?;

    tracing::info!(
        admin_id = %auth.admin_id,
        client_id = %client_id,
        plan_id = %body.plan_id,
        "Subscription changed"
    );

    Ok(Json(tx.into()))
}

// ============================================================================
// Period close
// ============================================================================

/// Close the open period: freeze its snapshot, roll over credits and allocate
/// the next allotment. Returns the frozen snapshot.
pub async fn close_period(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(client_id): Path<String>,
) -> Result<Json<ClientUsage>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let closed = state
        .store
        .close_period(&client_id, &state.config.policy, Utc::now())?;

    tracing::info!(
        admin_id = %auth.admin_id,
        client_id = %client_id,
        period = %closed.period,
        total_bill = %closed.total_bill,
        "Billing period closed"
    );

    Ok(Json(closed))
}
