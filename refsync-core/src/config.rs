//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or no file) is a valid config
//! as long as an API key is available from the environment.

use crate::domain::PriceTable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable consulted when `api.api_key` is empty.
pub const API_KEY_ENV: &str = "REFSYNC_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefsyncConfig {
    pub api: ApiConfig,
    pub bulk: BulkConfig,
    pub store: StoreConfig,
}

/// Table API access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Datatable namespace; tables resolve to `<namespace>/<TABLE>`.
    pub namespace: String,
    pub page_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.nasdaq.com/api/v3".into(),
            api_key: String::new(),
            namespace: "SHARADAR".into(),
            page_size: 10_000,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl ApiConfig {
    /// Fully qualified table name.
    pub fn table(&self, code: &str) -> String {
        format!("{}/{code}", self.namespace)
    }

    /// Configured key, or the `REFSYNC_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
    }
}

/// Bulk export parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Rows per parse batch.
    pub batch_size: usize,
    /// Worker threads; 0 means available parallelism.
    pub workers: usize,
    /// Bytes between progress callouts; 0 disables them.
    pub progress_interval_bytes: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            workers: 0,
            progress_interval_bytes: 64 * 1024 * 1024,
        }
    }
}

impl BulkConfig {
    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Output store and tables to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub tables: Vec<PriceTable>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            tables: PriceTable::DEFAULT.to_vec(),
        }
    }
}

impl RefsyncConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url is empty".into()));
        }
        if self.api.page_size == 0 || self.api.page_size > crate::data::MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "api.page_size must be in 1..={}, got {}",
                crate::data::MAX_PAGE_SIZE,
                self.api.page_size
            )));
        }
        if self.bulk.batch_size == 0 {
            return Err(ConfigError::Invalid("bulk.batch_size must be > 0".into()));
        }
        Ok(())
    }
}
