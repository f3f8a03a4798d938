//! Statement export.
//!
//! A statement is a flat table: a summary block, a feature usage block and the
//! transaction history, separated by blank rows. The open period's usage block
//! carries the plan/overage columns; closed periods omit them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::{compute_summary, BillingSummary};
use crate::catalog::Catalog;
use crate::client::Client;
use crate::error::Result;
use crate::period::PeriodSelector;
use crate::policy::BillingPolicy;

/// Header of the feature block for the open period.
pub const CURRENT_USAGE_HEADER: [&str; 8] = [
    "Category",
    "Feature",
    "Units Used",
    "Credits/Unit",
    "From Plan",
    "Overage",
    "Overage Cost",
    "Total Credits",
];

/// Header of the feature block for closed periods.
pub const HISTORICAL_USAGE_HEADER: [&str; 5] =
    ["Category", "Feature", "Units Used", "Credits/Unit", "Total Credits"];

/// Header of the transaction block.
pub const TRANSACTION_HEADER: [&str; 5] = ["Date", "Type", "Description", "Amount", "Balance"];

/// An exported statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Rows in display order. Empty rows separate sections.
    pub rows: Vec<Vec<String>>,
}

impl Statement {
    /// Render as CSV with `\n` line endings.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let line: Vec<_> = row.iter().map(|field| csv_field(field)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    /// Suggested download name, e.g. `hope_db-2024-07-statement.csv`.
    #[must_use]
    pub fn file_name(client: &Client, summary: &BillingSummary) -> String {
        format!("{}-{}-statement.csv", client.db_name, summary.period)
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

fn row<I, S>(cells: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    cells.into_iter().map(Into::into).collect()
}

/// Build the statement of `client` for `selector`.
///
/// # Errors
///
/// Propagates the errors of [`compute_summary`].
pub fn export_statement(
    client: &Client,
    catalog: &Catalog,
    selector: PeriodSelector,
    policy: &BillingPolicy,
    today: NaiveDate,
) -> Result<Statement> {
    let summary = compute_summary(client, catalog, selector, policy, today)?;
    Ok(render(client, &summary))
}

/// Lay out an already computed summary.
#[must_use]
pub fn render(client: &Client, summary: &BillingSummary) -> Statement {
    let mut rows = vec![
        row(["Client Name", client.name.as_str()]),
        row(["Database Name", client.db_name.as_str()]),
        row(["Billing Period".to_string(), summary.period.label()]),
        Vec::new(),
        row(["Billing Summary"]),
        row([
            "Subscription".to_string(),
            format!("{} Plan", summary.plan_name),
            money(summary.base_fee),
        ]),
    ];

    match (summary.overage_credits, summary.overage_cost) {
        (Some(credits), Some(cost)) => rows.push(row([
            "Overage Cost".to_string(),
            format!("{credits} credits"),
            money(cost),
        ])),
        _ => rows.push(row(["Overage Cost", "N/A", "N/A"])),
    }
    for discount in &summary.discounts {
        rows.push(row([
            "Discount".to_string(),
            discount.description.clone(),
            format!("-{}", money(discount.amount)),
        ]));
    }
    if summary.one_time_charges > Decimal::ZERO {
        rows.push(row([
            "One-Time Charges".to_string(),
            String::new(),
            money(summary.one_time_charges),
        ]));
    }
    rows.push(Vec::new());
    rows.push(row(["Total Bill".to_string(), String::new(), money(summary.total_bill)]));
    rows.push(Vec::new());
    rows.push(Vec::new());

    rows.push(row(["Feature Usage Breakdown"]));
    if summary.is_current {
        rows.push(row(CURRENT_USAGE_HEADER));
    } else {
        rows.push(row(HISTORICAL_USAGE_HEADER));
    }
    for category in &summary.categories {
        for feature in &category.features {
            let mut cells = vec![
                category.category.clone(),
                feature.name.clone(),
                feature.units.normalize().to_string(),
                feature.credits_per_unit.to_string(),
            ];
            if summary.is_current {
                cells.push(feature.credits_from_plan.unwrap_or_default().to_string());
                cells.push(feature.overage_credits.unwrap_or_default().to_string());
                cells.push(money(feature.overage_cost.unwrap_or_default()));
            }
            cells.push(feature.total_credits.to_string());
            rows.push(cells);
        }
    }
    rows.push(Vec::new());
    rows.push(Vec::new());

    rows.push(row(["Transaction History"]));
    rows.push(row(TRANSACTION_HEADER));
    let mut history: Vec<_> = client.transactions_in(summary.period).collect();
    history.reverse();
    history.sort_by_key(|tx| std::cmp::Reverse(tx.occurred_at));
    for tx in history {
        rows.push(vec![
            tx.occurred_at.format("%Y-%m-%d").to_string(),
            tx.transaction_type.to_string(),
            tx.description.clone(),
            tx.amount.to_string(),
            tx.balance_after.to_string(),
        ]);
    }

    Statement { rows }
}
