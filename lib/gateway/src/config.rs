//! Gateway connection configuration.

use serde::Deserialize;
use std::time::Duration;

/// Where and how to reach the persistence service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the service, e.g. `http://localhost:5300`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5300".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the root of the workflow API, without a trailing slash.
    #[must_use]
    pub fn workflows_url(&self) -> String {
        format!("{}/api/v1/workflow", self.base_url.trim_end_matches('/'))
    }
}
