//! Billing summary and statement handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use tally_core::statement::render;
use tally_core::{compute_summary, BillingSummary, Client, PeriodSelector, Statement};
use tally_store::Store;

use super::parse_client_id;
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Period query: `current` (default) or `YYYY-MM`.
#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    /// Period selector.
    #[serde(default)]
    pub period: Option<String>,
}

impl PeriodQuery {
    fn selector(&self) -> Result<PeriodSelector, ApiError> {
        match self.period.as_deref() {
            None | Some("") => Ok(PeriodSelector::Current),
            Some(raw) => Ok(raw.parse()?),
        }
    }
}

fn summarize(
    state: &AppState,
    client_id: &str,
    query: &PeriodQuery,
) -> Result<(Client, BillingSummary), ApiError> {
    let client_id = parse_client_id(client_id)?;
    let selector = query.selector()?;
    let client = state.store.get_client(&client_id)?;
    let catalog = state.store.catalog();

    let summary = compute_summary(
        &client,
        &catalog,
        selector,
        &state.config.policy,
        Utc::now().date_naive(),
    )?;
    Ok((client, summary))
}

/// Compute the billing summary for a period.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(client_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<BillingSummary>, ApiError> {
    let (_, summary) = summarize(&state, &client_id, &query)?;
    Ok(Json(summary))
}

/// Export the statement for a period as CSV.
pub async fn get_statement(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(client_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (client, summary) = summarize(&state, &client_id, &query)?;
    let statement = render(&client, &summary);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        Statement::file_name(&client, &summary)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        statement.to_csv(),
    ))
}
