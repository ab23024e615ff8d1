//! Server and reconciler configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! none at all) is valid. CLI flags in the binary override the file.

use std::path::Path;

use fog_view_core::constants::DEFAULT_CIPHERTEXT_LEN;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// What to do with missed block ranges when the request has no address key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedRangePolicy {
    /// Report ranges to every caller
    #[default]
    Report,
    /// Omit ranges unless the caller supplied an address key
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Keys past this position in one request are answered `RateLimited`
    pub max_keys_per_call: usize,
    /// Search batches allowed in flight at once; excess batches are shed
    pub max_concurrent_searches: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_keys_per_call: 500,
            max_concurrent_searches: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Per sub-call deadline
    pub collaborator_timeout_ms: u64,
    /// Requests with more keys than this are rejected outright
    pub max_search_keys: usize,
    /// Fixed payload length of every search outcome
    pub ciphertext_len: usize,
    pub decommissions_without_address: bool,
    pub missed_ranges_without_address: MissedRangePolicy,
    pub rate_limit: RateLimitConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 5_000,
            max_search_keys: 2_000,
            ciphertext_len: DEFAULT_CIPHERTEXT_LEN,
            decommissions_without_address: true,
            missed_ranges_without_address: MissedRangePolicy::Report,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.collaborator_timeout_ms == 0 {
            return Err(ServerError::InvalidConfig(
                "collaborator_timeout_ms must be positive".into(),
            ));
        }
        if self.max_search_keys == 0 {
            return Err(ServerError::InvalidConfig(
                "max_search_keys must be positive".into(),
            ));
        }
        if self.ciphertext_len == 0 {
            return Err(ServerError::InvalidConfig(
                "ciphertext_len must be positive".into(),
            ));
        }
        if self.rate_limit.max_concurrent_searches == 0 {
            return Err(ServerError::InvalidConfig(
                "rate_limit.max_concurrent_searches must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    pub bind_addr: String,
    /// HTTP requests handled at once
    pub max_concurrent_requests: usize,
    /// Serve Prometheus text at /metrics
    pub enable_metrics: bool,
    pub reconciler: ReconcilerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            max_concurrent_requests: 256,
            enable_metrics: false,
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&contents)?;
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            max_search_keys = config.reconciler.max_search_keys,
            missed_ranges_without_address = ?config.reconciler.missed_ranges_without_address,
            "Configuration loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(ServerError::InvalidConfig(
                "max_concurrent_requests must be positive".into(),
            ));
        }
        self.reconciler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert!(config.reconciler.decommissions_without_address);
        assert_eq!(
            config.reconciler.missed_ranges_without_address,
            MissedRangePolicy::Report
        );
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "bind_addr": "127.0.0.1:4000",
                "reconciler": {{
                    "missed_ranges_without_address": "suppress",
                    "rate_limit": {{ "max_keys_per_call": 10 }}
                }}
            }}"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:4000");
        assert_eq!(
            config.reconciler.missed_ranges_without_address,
            MissedRangePolicy::Suppress
        );
        assert_eq!(config.reconciler.rate_limit.max_keys_per_call, 10);
        assert_eq!(config.reconciler.rate_limit.max_concurrent_searches, 64);
        assert_eq!(config.reconciler.ciphertext_len, DEFAULT_CIPHERTEXT_LEN);
    }

    #[test]
    fn test_load_rejects_zero_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "reconciler": {{ "collaborator_timeout_ms": 0 }} }}"#).unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }
}
