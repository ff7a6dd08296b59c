//! Raw database configuration
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! page_size = 4096
//! max_cached_pages = 4096
//! batch_run_period_ms = 100
//! batch_yield_timeout_ms = 50
//! ```

use crate::error::{RawDatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Smallest supported page size
pub const MIN_PAGE_SIZE: usize = 512;
/// Largest supported page size
pub const MAX_PAGE_SIZE: usize = 1024 * 1024;

fn default_page_size() -> usize {
    4096
}

fn default_max_cached_pages() -> usize {
    4096
}

fn default_batch_run_period_ms() -> u64 {
    100
}

fn default_batch_yield_timeout_ms() -> u64 {
    50
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDatabaseConfig {
    /// Page size in bytes; a power of two in `[512, 1 MiB]`
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Clean pages kept in the cache before LRU eviction
    #[serde(default = "default_max_cached_pages")]
    pub max_cached_pages: usize,
    /// Time slice of one batch run step
    #[serde(default = "default_batch_run_period_ms")]
    pub batch_run_period_ms: u64,
    /// How long a batch waits between steps for queued transactions
    #[serde(default = "default_batch_yield_timeout_ms")]
    pub batch_yield_timeout_ms: u64,
}

impl Default for RawDatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_cached_pages: default_max_cached_pages(),
            batch_run_period_ms: default_batch_run_period_ms(),
            batch_yield_timeout_ms: default_batch_yield_timeout_ms(),
        }
    }
}

impl RawDatabaseConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RawDatabaseConfig =
            toml::from_str(content).map_err(|e| RawDatabaseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RawDatabaseError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RawDatabaseError::Config(e.to_string()))
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two()
            || self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(RawDatabaseError::Config(format!(
                "page_size {} must be a power of two in [{}, {}]",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if self.max_cached_pages == 0 {
            return Err(RawDatabaseError::Config(
                "max_cached_pages must be greater than zero".to_string(),
            ));
        }
        if self.batch_run_period_ms == 0 {
            return Err(RawDatabaseError::Config(
                "batch_run_period_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Time slice of one batch run step
    pub fn batch_run_period(&self) -> Duration {
        Duration::from_millis(self.batch_run_period_ms)
    }

    /// Yield timeout between batch steps
    pub fn batch_yield_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_yield_timeout_ms)
    }
}
