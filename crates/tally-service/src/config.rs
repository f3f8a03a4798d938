//! Service configuration.

use std::str::FromStr;

use tally_core::{BillingPolicy, Catalog};
use tally_store::MemoryStore;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// JSON catalog file. The built-in catalog is used when unset.
    pub catalog_path: Option<String>,

    /// Service API key for usage reporting.
    pub service_api_key: Option<String>,

    /// Admin API key for management endpoints.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Recommendation, rollover and alert thresholds.
    pub policy: BillingPolicy,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Unset or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let policy = BillingPolicy {
            materiality_threshold: parsed_or(
                &lookup,
                "UPGRADE_SAVINGS_THRESHOLD",
                defaults.policy.materiality_threshold,
            ),
            rollover_cap_percent: parsed_or(
                &lookup,
                "ROLLOVER_CAP_PERCENT",
                defaults.policy.rollover_cap_percent,
            ),
            upsell_usage_ratio: parsed_or(
                &lookup,
                "UPSELL_USAGE_RATIO",
                defaults.policy.upsell_usage_ratio,
            ),
            low_usage_ratio: parsed_or(&lookup, "LOW_USAGE_RATIO", defaults.policy.low_usage_ratio),
            ..defaults.policy
        };

        Self {
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            catalog_path: lookup("CATALOG_PATH").filter(|p| !p.trim().is_empty()),
            service_api_key: lookup("SERVICE_API_KEY"),
            admin_api_key: lookup("ADMIN_API_KEY"),
            cors_origins: lookup("CORS_ORIGINS").map_or(defaults.cors_origins, |s| {
                s.split(',').map(|s| s.trim().to_string()).collect()
            }),
            max_body_bytes: parsed_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: parsed_or(
                &lookup,
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            policy,
        }
    }

    /// The catalog to start with: the configured file, or the built-in one.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the file cannot be read or is invalid.
    pub fn load_catalog(&self) -> tally_store::Result<Catalog> {
        match &self.catalog_path {
            Some(path) => MemoryStore::load_catalog(path),
            None => {
                tracing::info!("No catalog file configured, using built-in catalog");
                Ok(Catalog::default())
            }
        }
    }
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key = %key, value = %raw, "Ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            catalog_path: None,
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            policy: BillingPolicy::default(),
        }
    }
}
