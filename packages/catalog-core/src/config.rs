//! Harness configuration.
//!
//! Supports TOML config files, environment variable overrides, and defaults.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Upper bound for any per-call timeout.
const MAX_TIMEOUT_MS: u64 = 9_999;
const MAX_RETRIES: u32 = 3;

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the service under test, without trailing slash
    pub base_url: String,
    /// SQLite database backing the service
    pub database_path: PathBuf,
    /// Per HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Per store operation timeout in milliseconds
    pub db_timeout_ms: u64,
    /// Delay before the first reconciliation retry in milliseconds
    pub retry_backoff_ms: u64,
    /// Reconciliation retries before a divergence is declared
    pub max_retries: u32,
    /// Seed for fixture generation (random when unset)
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8189/market/api/v1".to_string(),
            database_path: PathBuf::from("./market.db"),
            request_timeout_ms: 5000, // 5 seconds default
            db_timeout_ms: 5000,
            retry_backoff_ms: 250,
            max_retries: 1,
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HarnessError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| HarnessError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Applies environment variable overrides.
    /// Environment variables are prefixed with `CATALOG_`.
    /// Example: `CATALOG_BASE_URL=http://host/api` overrides `base_url`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`, keyed by environment variable
    /// name.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CATALOG_BASE_URL") {
            self.base_url = val;
        }
        if let Some(val) = lookup("CATALOG_DATABASE_PATH") {
            self.database_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("CATALOG_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_override("request_timeout_ms", &val)?;
        }
        if let Some(val) = lookup("CATALOG_DB_TIMEOUT_MS") {
            self.db_timeout_ms = parse_override("db_timeout_ms", &val)?;
        }
        if let Some(val) = lookup("CATALOG_RETRY_BACKOFF_MS") {
            self.retry_backoff_ms = parse_override("retry_backoff_ms", &val)?;
        }
        if let Some(val) = lookup("CATALOG_MAX_RETRIES") {
            self.max_retries = parse_override("max_retries", &val)?;
        }
        if let Some(val) = lookup("CATALOG_SEED") {
            self.seed = Some(parse_override("seed", &val)?);
        }
        Ok(())
    }

    /// Checks that timeouts and retries are bounded and the base URL is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(HarnessError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("db_timeout_ms", self.db_timeout_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(HarnessError::Config(format!(
                    "{} must be between 1 and {} ms, got {}",
                    name, MAX_TIMEOUT_MS, value
                )));
            }
        }
        if self.retry_backoff_ms > MAX_TIMEOUT_MS {
            return Err(HarnessError::Config(format!(
                "retry_backoff_ms must not exceed {} ms",
                MAX_TIMEOUT_MS
            )));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(HarnessError::Config(format!(
                "max_retries must not exceed {}, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, val: &str) -> Result<T> {
    val.parse()
        .map_err(|_| HarnessError::Config(format!("Invalid {}: {}", name, val)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
            base_url = "http://127.0.0.1:9000/api"
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.db_timeout_ms, 5000);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "database_path = \"/tmp/shop.db\"\nmax_retries = 2\n").unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.max_retries, 2);

        let missing = HarnessConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CATALOG_BASE_URL", "https://shop.test/api"),
            ("CATALOG_DB_TIMEOUT_MS", "1500"),
            ("CATALOG_SEED", "99"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::new();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url, "https://shop.test/api");
        assert_eq!(config.db_timeout_ms, 1500);
        assert_eq!(config.seed, Some(99));
        assert_eq!(config.request_timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = HarnessConfig::new();
        let result = config.apply_overrides_from(|key| {
            (key == "CATALOG_MAX_RETRIES").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_timeouts() {
        let config = HarnessConfig {
            request_timeout_ms: 30_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HarnessConfig {
            base_url: "localhost:8189".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_retries() {
        let config = HarnessConfig {
            max_retries: 3,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let mut config = HarnessConfig::new();
        config
            .apply_overrides_from(|key| (key == "CATALOG_MAX_RETRIES").then(|| "50".to_string()))
            .unwrap();
        assert!(matches!(config.validate(), Err(HarnessError::Config(_))));
    }
}
