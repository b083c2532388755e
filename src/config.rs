//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Connection settings are not part of this config; sessions are built
//! externally.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Result type for config loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read(_) | ConfigError::Parse(_) => "CASSMAP_CONFIG_UNREADABLE",
            ConfigError::Invalid { .. } => "CASSMAP_CONFIG_INVALID",
        }
    }
}

/// Runtime settings for an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Keyspace used for catalog lookups (required for schema sync)
    #[serde(default)]
    pub keyspace: Option<String>,

    /// Max rows per unlogged batch (default: 100)
    #[serde(default = "default_max_batch_rows")]
    pub max_batch_rows: usize,

    /// Max estimated bytes per unlogged batch (default: 50 KiB)
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Batches in flight at once in non-blocking mode (default: 4)
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Page size when a caller asks for paging without a size (default: 5000)
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Prepare statements before execution (default: true)
    #[serde(default = "default_true")]
    pub prepare_statements: bool,

    /// Log a warning for filters on unindexed columns (default: true)
    #[serde(default = "default_true")]
    pub warn_on_unindexed_filter: bool,

    /// Max chunk failures kept in a partial batch error (default: 3)
    #[serde(default = "default_max_reported_failures")]
    pub max_reported_failures: usize,
}

fn default_max_batch_rows() -> usize {
    100
}
fn default_max_batch_bytes() -> usize {
    50 * 1024
}
fn default_max_concurrent_batches() -> usize {
    4
}
fn default_page_size() -> u32 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_max_reported_failures() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keyspace: None,
            max_batch_rows: default_max_batch_rows(),
            max_batch_bytes: default_max_batch_bytes(),
            max_concurrent_batches: default_max_concurrent_batches(),
            default_page_size: default_page_size(),
            prepare_statements: true,
            warn_on_unindexed_filter: true,
            max_reported_failures: default_max_reported_failures(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("max_batch_rows", self.max_batch_rows),
            ("max_batch_bytes", self.max_batch_bytes),
            ("max_concurrent_batches", self.max_concurrent_batches),
            ("default_page_size", self.default_page_size as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be > 0".to_string(),
                });
            }
        }

        if let Some(keyspace) = &self.keyspace {
            if !crate::schema::is_valid_identifier(keyspace) {
                return Err(ConfigError::Invalid {
                    field: "keyspace",
                    reason: format!("'{}' is not a valid identifier", keyspace),
                });
            }
        }

        Ok(())
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn with_max_batch_rows(mut self, rows: usize) -> Self {
        self.max_batch_rows = rows;
        self
    }

    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    pub fn with_max_concurrent_batches(mut self, batches: usize) -> Self {
        self.max_concurrent_batches = batches;
        self
    }

    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    pub fn with_prepare_statements(mut self, prepare: bool) -> Self {
        self.prepare_statements = prepare;
        self
    }

    pub fn with_max_reported_failures(mut self, max: usize) -> Self {
        self.max_reported_failures = max;
        self
    }
}
