//! Common test utilities for tally integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use tally_service::{create_router, AppState, ServiceConfig};
use tally_store::MemoryStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for direct inspection.
    pub store: Arc<MemoryStore>,
    /// The service API key for usage reporting.
    pub service_api_key: String,
    /// The admin API key for management endpoints.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness over an empty store and the built-in catalog.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::clone(&store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            service_api_key,
            admin_api_key,
        }
    }

    /// Register a client and return its JSON representation.
    pub async fn create_client(&self, name: &str, plan_id: &str, record_count: u64) -> Value {
        let response = self
            .server
            .post("/v1/clients")
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&json!({
                "name": name,
                "db_name": format!("{}_db", name.to_lowercase().replace(' ', "_")),
                "plan_id": plan_id,
                "record_count": record_count,
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }

    /// Report usage with the service key.
    pub async fn report_usage(&self, client_id: &str, feature_id: &str, units: u64) -> Value {
        let response = self
            .server
            .post(&format!("/v1/clients/{client_id}/usage"))
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&json!({ "feature_id": feature_id, "units": units }))
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a decimal serialized as a JSON string.
pub fn money(value: &Value) -> rust_decimal::Decimal {
    value
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("valid decimal")
}
