//! Typed cache entry point
//!
//! Callers store and fetch domain objects (realty, user, transaction,
//! contract records) through a generic serde API; the payload is kept as
//! serialized JSON inside the store. The handle is constructed once at
//! startup and passed by reference to every consumer.

use crate::adaptive::AdaptiveCache;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::store::HybridStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::info;

/// Process-wide cache handle
///
/// Cloning shares the same underlying store and statistics; construct exactly
/// one per process and hand clones to consumers.
#[derive(Clone)]
pub struct RealtyCache {
    layer: AdaptiveCache,
}

impl RealtyCache {
    /// Build the cache stack and start both background loops
    pub fn new(config: CacheConfig) -> Self {
        info!(
            "Initializing realty cache (capacity={}KB, sweep={}ms, adapt={}ms)",
            config.capacity_kb, config.sweep_interval_ms, config.adapt_interval_ms
        );

        let store = HybridStore::new(config.capacity_kb, config.sweep_interval());
        store.start_sweeper();

        let layer = AdaptiveCache::new(store, config.adapt_interval());
        layer.start_adjustment();

        Self { layer }
    }

    /// Store a value, estimating its size from the serialized payload
    ///
    /// The estimate is the payload length rounded up to whole KB, never less
    /// than 1KB. Serialization failure aborts the write.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        self.put_with_size(key, value, 0, ttl)
    }

    /// Store a value with a caller-declared size; zero falls back to estimation
    pub fn put_with_size<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        size_kb: u64,
        ttl: Duration,
    ) -> Result<()> {
        let payload =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let size_kb = if size_kb == 0 {
            estimate_size_kb(&payload)
        } else {
            size_kb
        };
        self.layer.put(key, payload, size_kb, ttl)
    }

    /// Fetch a value decoded into the caller's type
    ///
    /// Absent and expired keys are `Ok(None)`; a stored payload that does not
    /// decode into `T` is an error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.layer.get(key) {
            None => Ok(None),
            Some(payload) => serde_json::from_slice(&payload)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.layer.remove(key)
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        self.layer.remove_prefix(prefix)
    }

    pub fn hit_rate(&self) -> f64 {
        self.layer.hit_rate()
    }

    pub fn count(&self) -> usize {
        self.layer.count()
    }

    pub fn current_size_kb(&self) -> u64 {
        self.layer.current_size_kb()
    }

    /// Stop both background loops; the cache itself stays usable
    pub fn shutdown(&self) {
        self.layer.shutdown();
    }
}

impl Default for RealtyCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn estimate_size_kb(payload: &[u8]) -> u64 {
    (payload.len() as u64).div_ceil(1024).max(1)
}
