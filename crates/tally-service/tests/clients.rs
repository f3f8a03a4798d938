//! Client registration and catalog integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};
use tally_core::BillingPeriod;
use tally_store::Store;

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn create_client_without_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/clients")
        .json(&json!({ "name": "Hope", "db_name": "hope_db", "plan_id": "starter" }))
        .await;

    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn create_client_with_wrong_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/clients")
        .add_header("x-admin-key", "not-the-key".to_string())
        .json(&json!({ "name": "Hope", "db_name": "hope_db", "plan_id": "starter" }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn service_key_cannot_manage_clients() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/clients")
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Clients
// ============================================================================

#[tokio::test]
async fn create_client_allocates_first_allotment() {
    let harness = TestHarness::new();

    let client = harness.create_client("Hope", "professional", 32_000).await;

    assert_eq!(client["name"], "Hope");
    assert_eq!(client["plan_id"], "professional");
    assert_eq!(client["status"], "active");
    assert_eq!(client["balance"]["monthly"], 15_000);
    assert_eq!(client["credits_remaining"], 15_000);
    assert_eq!(client["record_count"], 32_000);
    assert!(client["closed_periods"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn create_client_with_unknown_plan_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/clients")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({ "name": "Hope", "db_name": "hope_db", "plan_id": "platinum" }))
        .await;

    response.assert_status_not_found();
    assert!(harness.store.list_clients().is_empty());
}

#[tokio::test]
async fn create_client_twice_conflicts() {
    let harness = TestHarness::new();
    let client = harness.create_client("Hope", "starter", 0).await;

    let response = harness
        .server
        .post("/v1/clients")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "id": client["id"],
            "name": "Hope Again",
            "db_name": "hope_db",
            "plan_id": "starter"
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_client_by_id() {
    let harness = TestHarness::new();
    let created = harness.create_client("Hope", "starter", 0).await;
    let id = created["id"].as_str().unwrap();

    let response = harness
        .server
        .get(&format!("/v1/clients/{id}"))
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], created["id"]);
    assert_eq!(body["credits_remaining"], 5_000);
}

#[tokio::test]
async fn client_offers_recent_periods() {
    let harness = TestHarness::new();
    let created = harness.create_client("Hope", "starter", 0).await;
    let id = created["id"].as_str().unwrap();

    let body: Value = harness
        .server
        .get(&format!("/v1/clients/{id}"))
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await
        .json();

    let options = body["period_options"].as_array().unwrap();
    assert_eq!(options.len(), 7);
    assert_eq!(options[0]["value"], "current");

    let current: BillingPeriod = body["current_period"].as_str().unwrap().parse().unwrap();
    assert_eq!(options[1]["value"], current.previous().to_string());
    assert_eq!(options[1]["label"], current.previous().label());
    let oldest = (0..6).fold(current, |period, _| period.previous());
    assert_eq!(options[6]["value"], oldest.to_string());
}

#[tokio::test]
async fn get_unknown_client_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/clients/4f6c2b0e-3c1d-4a8e-9b57-0a1f2e3d4c5b")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn get_client_with_malformed_id_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/clients/not-a-uuid")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_clients_sorted_by_name() {
    let harness = TestHarness::new();
    harness.create_client("Zephyr Trust", "starter", 0).await;
    harness.create_client("Acme Relief", "enterprise", 10_000).await;

    let response = harness
        .server
        .get("/v1/clients")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let names: Vec<_> = body["clients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Acme Relief", "Zephyr Trust"]);
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn get_catalog_returns_builtin_plans() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/catalog")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let plans: Vec<_> = body["plans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();
    assert!(plans.iter().any(|p| p == "professional"));
}

#[tokio::test]
async fn replace_catalog_rejects_invalid_snapshot() {
    let harness = TestHarness::new();

    let catalog: Value = harness
        .server
        .get("/v1/catalog")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .await
        .json();

    let mut broken = catalog.clone();
    let first_plan = broken["plans"][0].clone();
    broken["plans"].as_array_mut().unwrap().push(first_plan);

    let response = harness
        .server
        .put("/v1/catalog")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&broken)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let mut trimmed = catalog;
    trimmed["plans"]
        .as_array_mut()
        .unwrap()
        .retain(|p| p["id"] != "beta-growth");

    let response = harness
        .server
        .put("/v1/catalog")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&trimmed)
        .await;
    response.assert_status_ok();
    assert!(harness
        .store
        .catalog()
        .plans
        .iter()
        .all(|p| p.id.as_str() != "beta-growth"));
}
