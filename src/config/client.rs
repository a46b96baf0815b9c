//! Backend and consumer configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Backend request/reply endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Chat backend (login, channels, history, ...).
    pub rpc_addr: String,
    /// Reference service holding the server roster.
    pub reference_addr: String,
    /// Per-call timeout.
    pub timeout_ms: u64,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "127.0.0.1:5555".to_string(),
            reference_addr: "127.0.0.1:5559".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// Terminal consumer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway base URL.
    pub gateway_url: String,
    /// User to log in as.
    pub user: String,
    /// Channel to join after login.
    pub channel: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8080".to_string(),
            user: "guest".to_string(),
            channel: None,
        }
    }
}
