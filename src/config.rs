use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the cache stack
///
/// All three parameters are fixed at construction time; there is no runtime
/// reconfiguration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum total declared entry size in KB
    pub capacity_kb: u64,
    /// Expiration sweep interval in milliseconds
    pub sweep_interval_ms: u64,
    /// TTL adaptation interval in milliseconds
    pub adapt_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_kb: 10 * 1024,
            sweep_interval_ms: 5 * 60 * 1000,
            adapt_interval_ms: 30 * 1000,
        }
    }
}

impl CacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn adapt_interval(&self) -> Duration {
        Duration::from_millis(self.adapt_interval_ms)
    }
}
