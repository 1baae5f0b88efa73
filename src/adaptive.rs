//! Adaptive TTL layer
//!
//! Wraps the hybrid store, observes per-key access patterns and periodically
//! retunes hot keys' TTLs: frequently and successfully accessed keys get a
//! longer expiration, up to a fixed ceiling. Statistics live entirely in this
//! layer; the store is only reached through its public operations, and never
//! while the statistics lock is held.

use crate::error::Result;
use crate::store::HybridStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Baseline TTL handed to the adaptation formula
const BASE_TTL: Duration = Duration::from_secs(5 * 60);
/// Ceiling for adapted TTLs
const MAX_TTL: Duration = Duration::from_secs(30 * 60);
/// EMA weight of the newest hit/miss sample
const HIT_RATE_ALPHA: f64 = 0.3;
/// Stats idle for more than this many adaptation intervals are pruned
const PRUNE_INTERVALS: u32 = 5;
/// Stats touched within this many adaptation intervals are retuned
const ACTIVE_INTERVALS: u32 = 3;

/// Per-key access statistics
///
/// Lifecycle is independent of the cached entry: a stat can outlive its entry
/// (until pruned) and an entry can exist without a stat (after pruning).
#[derive(Debug, Clone)]
pub struct AccessStat {
    pub access_count: u64,
    pub last_access: Instant,
    /// Rolling hit rate in [0,1], exponential moving average
    pub hit_rate: f64,
    /// TTL most recently pushed into the store for this key
    pub current_ttl: Duration,
}

/// Candidate TTL for a key with the given access history
///
/// Multiplier ranges over [1,5] before the ceiling: access weight contributes
/// up to 3, hit rate up to 1.
pub fn adaptive_ttl(access_count: u64, hit_rate: f64) -> Duration {
    let access_weight = ((1.0 + access_count as f64).ln() / 2.0).min(3.0);
    BASE_TTL.mul_f64(1.0 + access_weight + hit_rate).min(MAX_TTL)
}

/// Store wrapper that retunes per-key TTLs from observed access patterns
#[derive(Clone)]
pub struct AdaptiveCache {
    store: HybridStore,
    stats: Arc<RwLock<HashMap<String, AccessStat>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    adapt_interval: Duration,
    stop: Arc<Notify>,
}

impl AdaptiveCache {
    pub fn new(store: HybridStore, adapt_interval: Duration) -> Self {
        info!(
            "Initializing adaptive cache layer (adapt_interval={:?})",
            adapt_interval
        );

        Self {
            store,
            stats: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            adapt_interval,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Start the background TTL adjustment task
    pub fn start_adjustment(&self) -> tokio::task::JoinHandle<()> {
        info!("Starting TTL adjustment task (interval={:?})", self.adapt_interval);

        let layer = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(layer.adapt_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        layer.adjust();
                    }
                    _ = layer.stop.notified() => break,
                }
            }
        })
    }

    /// Write through to the store and upsert the key's statistics
    ///
    /// An existing stat keeps its access count; last-access and the recorded
    /// TTL are reset. A brand-new key starts at count 0 and hit rate 0.
    pub fn put(&self, key: &str, value: Vec<u8>, size_kb: u64, ttl: Duration) -> Result<()> {
        self.store.put(key, value, size_kb, ttl)?;

        let mut stats = self.stats.write();
        let now = Instant::now();
        stats
            .entry(key.to_string())
            .and_modify(|stat| {
                stat.last_access = now;
                stat.current_ttl = ttl;
            })
            .or_insert(AccessStat {
                access_count: 0,
                last_access: now,
                hit_rate: 0.0,
                current_ttl: ttl,
            });

        Ok(())
    }

    /// Read through to the store, recording the hit or miss
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.store.get(key);
        let hit = value.is_some();

        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        let tracked = self.stats.read().contains_key(key);
        if tracked {
            let sample = if hit { 1.0 } else { 0.0 };
            let mut stats = self.stats.write();
            if let Some(stat) = stats.get_mut(key) {
                stat.access_count += 1;
                stat.last_access = Instant::now();
                stat.hit_rate = (1.0 - HIT_RATE_ALPHA) * stat.hit_rate + HIT_RATE_ALPHA * sample;
                return value;
            }
        }

        if hit {
            // Hit on an untracked key (stat was pruned while the entry lived
            // on): seed from the entry's residual TTL and the aggregate rate.
            // Snapshot is taken before the stats lock, never under it.
            let residual = self
                .store
                .entry_snapshot(key)
                .map(|snap| snap.residual_ttl)
                .unwrap_or(BASE_TTL);
            let seed_rate = self.hit_rate();

            let mut stats = self.stats.write();
            stats.entry(key.to_string()).or_insert(AccessStat {
                access_count: 1,
                last_access: Instant::now(),
                hit_rate: seed_rate,
                current_ttl: residual,
            });
        }

        value
    }

    /// Remove the cached value and its statistics
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.store.remove(key);
        self.stats.write().remove(key);
        removed
    }

    /// Remove every entry under the prefix, statistics included
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let removed = self.store.remove_prefix(prefix);
        self.stats
            .write()
            .retain(|key, _| !key.starts_with(prefix));
        removed
    }

    /// Number of stored entries (store pass-through)
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Cumulative declared size in KB (store pass-through)
    pub fn current_size_kb(&self) -> u64 {
        self.store.current_size_kb()
    }

    /// Aggregate hit rate since construction; 0 before any access
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// One adjustment pass: retune recently-touched keys, prune idle stats
    ///
    /// Candidates are snapshotted under a short read lock; store calls happen
    /// with no stats lock held, and recorded TTLs are written back afterwards.
    /// The re-put also refreshes the key's recency position.
    pub fn adjust(&self) {
        let now = Instant::now();
        let active_window = self.adapt_interval * ACTIVE_INTERVALS;
        let prune_window = self.adapt_interval * PRUNE_INTERVALS;

        let candidates: Vec<(String, Duration, Duration)> = {
            let stats = self.stats.read();
            stats
                .iter()
                .filter(|(_, stat)| now.duration_since(stat.last_access) <= active_window)
                .map(|(key, stat)| {
                    (
                        key.clone(),
                        adaptive_ttl(stat.access_count, stat.hit_rate),
                        stat.current_ttl,
                    )
                })
                .collect()
        };

        for (key, candidate, recorded) in candidates {
            if candidate == recorded {
                continue;
            }
            let Some(snap) = self.store.entry_snapshot(&key) else {
                // Evicted or expired since the snapshot; stat stays until pruned
                continue;
            };
            if self
                .store
                .put(&key, snap.value, snap.size_kb, candidate)
                .is_ok()
            {
                debug!("Adapted TTL for {}: {:?} -> {:?}", key, recorded, candidate);
                let mut stats = self.stats.write();
                if let Some(stat) = stats.get_mut(&key) {
                    stat.current_ttl = candidate;
                }
            }
        }

        let mut stats = self.stats.write();
        let before = stats.len();
        stats.retain(|_, stat| now.duration_since(stat.last_access) <= prune_window);
        let pruned = before - stats.len();
        if pruned > 0 {
            debug!("Pruned {} idle access stats", pruned);
        }
    }

    /// Stop the adjustment cycle, then shut the underlying store down
    pub fn shutdown(&self) {
        self.stop.notify_one();
        self.store.shutdown();
    }

    #[cfg(test)]
    fn stat(&self, key: &str) -> Option<AccessStat> {
        self.stats.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache(adapt_interval: Duration) -> AdaptiveCache {
        let store = HybridStore::new(1024, Duration::from_secs(300));
        AdaptiveCache::new(store, adapt_interval)
    }

    #[test]
    fn test_ttl_formula_baseline() {
        assert_eq!(adaptive_ttl(0, 0.0), BASE_TTL);
    }

    #[test]
    fn test_ttl_formula_monotone_in_access_count() {
        let mut previous = Duration::ZERO;
        for count in [0, 1, 5, 20, 100, 10_000] {
            let ttl = adaptive_ttl(count, 0.5);
            assert!(ttl >= previous, "ttl must not decrease with access count");
            previous = ttl;
        }
    }

    #[test]
    fn test_ttl_formula_bounded() {
        // Multiplier tops out at 5 (access weight 3 + hit rate 1), keeping
        // every candidate under the 30-minute ceiling
        assert_eq!(adaptive_ttl(u64::MAX, 1.0), BASE_TTL * 5);
        assert!(adaptive_ttl(u64::MAX, 1.0) <= MAX_TTL);
    }

    #[test]
    fn test_hit_rate_accounting() {
        let cache = cache(Duration::from_secs(30));
        assert_eq!(cache.hit_rate(), 0.0);

        cache.put("key1", vec![1], 1, HOUR).unwrap();
        cache.get("key1");
        cache.get("key1");
        cache.get("missing");

        let rate = cache.hit_rate();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stat_lifecycle_on_put_and_get() {
        let cache = cache(Duration::from_secs(30));

        cache.put("key1", vec![1], 1, HOUR).unwrap();
        let stat = cache.stat("key1").unwrap();
        assert_eq!(stat.access_count, 0);
        assert_eq!(stat.hit_rate, 0.0);
        assert_eq!(stat.current_ttl, HOUR);

        cache.get("key1");
        let stat = cache.stat("key1").unwrap();
        assert_eq!(stat.access_count, 1);
        assert!((stat.hit_rate - 0.3).abs() < 1e-9);

        // Overwrite keeps the count, resets the recorded TTL
        cache.put("key1", vec![2], 1, BASE_TTL).unwrap();
        let stat = cache.stat("key1").unwrap();
        assert_eq!(stat.access_count, 1);
        assert_eq!(stat.current_ttl, BASE_TTL);
    }

    #[test]
    fn test_hit_rate_ema_converges() {
        let cache = cache(Duration::from_secs(30));

        cache.put("hot", vec![1], 1, HOUR).unwrap();
        for _ in 0..20 {
            assert!(cache.get("hot").is_some());
        }

        let stat = cache.stat("hot").unwrap();
        assert_eq!(stat.access_count, 20);
        assert!(stat.hit_rate > 0.99, "EMA must approach 1.0 after 20 hits");
        assert!(stat.hit_rate <= 1.0);
    }

    #[test]
    fn test_miss_drags_ema_down() {
        let cache = cache(Duration::from_secs(30));

        cache.put("key1", vec![1], 1, HOUR).unwrap();
        cache.get("key1");

        // Remove from the store only; the stat survives and the next lookup
        // records a miss against it
        cache.store.remove("key1");
        assert!(cache.get("key1").is_none());

        let stat = cache.stat("key1").unwrap();
        assert_eq!(stat.access_count, 2);
        assert!(stat.hit_rate < 0.3);
    }

    #[test]
    fn test_untracked_hit_seeds_stat() {
        let cache = cache(Duration::from_secs(30));

        cache.put("key1", vec![1], 1, HOUR).unwrap();
        // Simulate a pruned stat while the entry lives on
        cache.stats.write().remove("key1");

        assert!(cache.get("key1").is_some());
        let stat = cache.stat("key1").unwrap();
        assert_eq!(stat.access_count, 1);
        assert!(stat.current_ttl <= HOUR);
        assert!(stat.current_ttl > Duration::from_secs(3590));
        assert_eq!(stat.hit_rate, 1.0, "seeded from the aggregate rate");
    }

    #[test]
    fn test_remove_drops_both_sides() {
        let cache = cache(Duration::from_secs(30));

        cache.put("key1", vec![1], 1, HOUR).unwrap();
        assert!(cache.remove("key1"));
        assert!(cache.stat("key1").is_none());
        assert!(cache.get("key1").is_none());
    }

    #[test]
    fn test_remove_prefix_drops_stats() {
        let cache = cache(Duration::from_secs(30));

        cache.put("realty:1", vec![1], 1, HOUR).unwrap();
        cache.put("realty:2", vec![2], 1, HOUR).unwrap();
        cache.put("user:1", vec![3], 1, HOUR).unwrap();

        assert_eq!(cache.remove_prefix("realty:"), 2);
        assert!(cache.stat("realty:1").is_none());
        assert!(cache.stat("realty:2").is_none());
        assert!(cache.stat("user:1").is_some());
    }

    #[test]
    fn test_adjust_extends_hot_key_ttl() {
        let cache = cache(Duration::from_secs(30));

        cache.put("hot", vec![1], 1, BASE_TTL).unwrap();
        for _ in 0..50 {
            cache.get("hot");
        }

        cache.adjust();

        let stat = cache.stat("hot").unwrap();
        assert!(
            stat.current_ttl > BASE_TTL,
            "hot key must get a longer TTL than the base"
        );
        let snap = cache.store.entry_snapshot("hot").unwrap();
        assert!(
            snap.residual_ttl > BASE_TTL,
            "new TTL must be pushed into the store"
        );
    }

    #[test]
    fn test_adjust_skips_departed_entries() {
        let cache = cache(Duration::from_secs(30));

        cache.put("gone", vec![1], 1, HOUR).unwrap();
        for _ in 0..10 {
            cache.get("gone");
        }
        cache.store.remove("gone");

        cache.adjust();

        // No entry to re-put; the stat stays until the prune window passes
        assert!(cache.store.entry_snapshot("gone").is_none());
        assert!(cache.stat("gone").is_some());
    }

    #[test]
    fn test_adjust_prunes_idle_stats() {
        let interval = Duration::from_millis(50);
        let cache = cache(interval);

        cache.put("idle", vec![1], 1, HOUR).unwrap();
        cache.put("fresh", vec![2], 1, HOUR).unwrap();

        // Push the idle stat past five adaptation intervals
        cache.stats.write().get_mut("idle").unwrap().last_access =
            Instant::now() - interval * (PRUNE_INTERVALS + 1);

        cache.adjust();

        assert!(cache.stat("idle").is_none());
        assert!(cache.stat("fresh").is_some());
        // Pruning statistics never touches the cached value itself
        assert!(cache.store.entry_snapshot("idle").is_some());
    }

    #[tokio::test]
    async fn test_adjustment_task_and_shutdown() {
        let store = HybridStore::new(1024, Duration::from_secs(300));
        let cache = AdaptiveCache::new(store, Duration::from_millis(50));
        let handle = cache.start_adjustment();

        cache
            .put("hot", vec![1], 1, Duration::from_millis(300))
            .unwrap();
        for _ in 0..50 {
            cache.get("hot");
        }

        // The adjustment loop re-puts the hot key with an adapted TTL well
        // beyond its original 300ms
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(cache.get("hot").is_some(), "adapted TTL must outlive the original");

        cache.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("adjustment task must stop after shutdown")
            .unwrap();
    }
}
