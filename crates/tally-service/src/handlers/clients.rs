//! Client registration and lookup handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{
    BillingPeriod, Client, ClientId, ClientStatus, ClientUsage, CreditBalance, PlanId,
};
use tally_store::Store;

use super::parse_client_id;
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Past periods offered to period pickers.
const RECENT_PERIODS: usize = 6;

/// Create client request.
#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    /// Client id; generated when omitted.
    #[serde(default)]
    pub id: Option<ClientId>,
    /// Organization name.
    pub name: String,
    /// Database name.
    pub db_name: String,
    /// Subscribed plan.
    pub plan_id: PlanId,
    /// Free-form segment.
    #[serde(default)]
    pub client_type: Option<String>,
    /// Account status (default: active).
    #[serde(default)]
    pub status: Option<ClientStatus>,
    /// Database records, for record-based plans.
    #[serde(default)]
    pub record_count: u64,
}

/// Client response, without the transaction log.
#[derive(Debug, Serialize)]
pub struct ClientResponse {
    /// Client id.
    pub id: ClientId,
    /// Organization name.
    pub name: String,
    /// Database name.
    pub db_name: String,
    /// Free-form segment.
    pub client_type: String,
    /// Account status.
    pub status: ClientStatus,
    /// Subscribed plan.
    pub plan_id: PlanId,
    /// Database records.
    pub record_count: u64,
    /// Sign-up date.
    pub created_on: NaiveDate,
    /// First day of the open period.
    pub billing_period_start: NaiveDate,
    /// The open period.
    pub current_period: BillingPeriod,
    /// Credit pools.
    pub balance: CreditBalance,
    /// Sum of all pools.
    pub credits_remaining: i64,
    /// Usage snapshot of the open period.
    pub current_usage: ClientUsage,
    /// Closed periods with a stored snapshot, newest first.
    pub closed_periods: Vec<BillingPeriod>,
    /// `period` values for summaries and statements: the open period, then
    /// the months before it, newest first.
    pub period_options: Vec<PeriodOption>,
}

/// A selectable billing period.
#[derive(Debug, Serialize)]
pub struct PeriodOption {
    /// `current` or `YYYY-MM`.
    pub value: String,
    /// Display label.
    pub label: String,
}

fn period_options(client: &Client) -> Vec<PeriodOption> {
    let current = PeriodOption {
        value: "current".into(),
        label: "Current Month".into(),
    };
    std::iter::once(current)
        .chain(
            BillingPeriod::recent(client.billing_period_start, RECENT_PERIODS)
                .into_iter()
                .map(|period| PeriodOption {
                    value: period.to_string(),
                    label: period.label(),
                }),
        )
        .collect()
}

impl From<&Client> for ClientResponse {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            db_name: client.db_name.clone(),
            client_type: client.client_type.clone(),
            status: client.status,
            plan_id: client.plan_id.clone(),
            record_count: client.record_count,
            created_on: client.created_on,
            billing_period_start: client.billing_period_start,
            current_period: client.current_period(),
            balance: client.balance,
            credits_remaining: client.credits_remaining(),
            current_usage: client.current_usage.clone(),
            closed_periods: client.history.keys().rev().copied().collect(),
            period_options: period_options(client),
        }
    }
}

/// List clients response.
#[derive(Debug, Serialize)]
pub struct ListClientsResponse {
    /// Clients ordered by name.
    pub clients: Vec<ClientResponse>,
}

/// Register a client and allocate its first monthly allotment.
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Client name is required".into()));
    }

    let now = Utc::now();
    let mut client = Client::new(
        body.id.unwrap_or_else(ClientId::generate),
        body.name,
        body.db_name,
        body.plan_id,
        now,
    );
    client.record_count = body.record_count;
    if let Some(client_type) = body.client_type {
        client.client_type = client_type;
    }
    if let Some(status) = body.status {
        client.status = status;
    }

    let client = state.store.create_client(client, now)?;

    tracing::info!(
        admin_id = %auth.admin_id,
        client_id = %client.id,
        plan_id = %client.plan_id,
        "Client registered"
    );

    Ok((StatusCode::CREATED, Json(ClientResponse::from(&client))))
}

/// List all clients.
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Json<ListClientsResponse> {
    let clients = state
        .store
        .list_clients()
        .iter()
        .map(ClientResponse::from)
        .collect();
    Json(ListClientsResponse { clients })
}

/// Get one client.
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(client_id): Path<String>,
) -> Result<Json<ClientResponse>, ApiError> {
    let client_id = parse_client_id(&client_id)?;
    let client = state.store.get_client(&client_id)?;
    Ok(Json(ClientResponse::from(&client)))
}
