//! Application configuration.
//!
//! Aggregates configuration from all components into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod client;
mod server;

pub use client::{BackendConfig, ClientConfig};
pub use server::{GatewayConfig, RelayConfig};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PARLEY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PARLEY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PARLEY_LOG";

use serde::Deserialize;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Topic relay bind addresses.
    pub relay: RelayConfig,
    /// Gateway HTTP and relay subscription.
    pub gateway: GatewayConfig,
    /// Backend request/reply endpoints.
    pub backend: BackendConfig,
    /// Terminal consumer settings.
    pub client: ClientConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.relay.inbound_addr, "0.0.0.0:5557");
        assert_eq!(config.relay.outbound_addr, "0.0.0.0:5558");
        assert_eq!(config.gateway.relay_addr, "127.0.0.1:5558");
        assert_eq!(config.backend.rpc_addr, "127.0.0.1:5555");
        assert_eq!(config.backend.reference_addr, "127.0.0.1:5559");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "relay:\n  high_water_mark: 5\nbackend:\n  timeout_ms: 250\nclient:\n  user: alice"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.relay.high_water_mark, 5);
        assert_eq!(config.backend.timeout_ms, 250);
        assert_eq!(config.client.user, "alice");
        // untouched sections keep defaults
        assert_eq!(config.gateway.http_addr, "0.0.0.0:8080");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("PARLEY__GATEWAY__HTTP_ADDR", "127.0.0.1:9999");
        let config = Config::load(None);
        std::env::remove_var("PARLEY__GATEWAY__HTTP_ADDR");

        assert_eq!(config.unwrap().gateway.http_addr, "127.0.0.1:9999");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some("/nonexistent/parley.yaml")).is_err());
    }
}
