//! Hybrid LRU + TTL store
//!
//! Capacity-bounded key-value store combining recency-based eviction with
//! absolute expiration. Capacity is accounted in KB of declared entry size;
//! eviction removes from the least-recently-used end until the bound holds.
//! Expiration is enforced lazily on lookup and in bulk by a periodic sweep.

use crate::error::{CacheError, Result};
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Stored entry with expiration metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Opaque serialized payload
    pub value: Vec<u8>,
    /// Declared size in KB, used for capacity accounting
    pub size_kb: u64,
    /// When the entry was created
    pub created_at: Instant,
    /// Absolute expiration time
    pub expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Vec<u8>, size_kb: u64, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            size_kb,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time view of an entry, handed to the adaptive layer
///
/// Taking a snapshot does not promote the entry's recency position.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub value: Vec<u8>,
    pub size_kb: u64,
    pub residual_ttl: Duration,
}

struct StoreInner {
    data: Trie<String, CacheEntry>,
    /// Recency order: least-recently-used at the front
    order: VecDeque<String>,
    used_kb: u64,
}

/// Concurrency-safe store with LRU eviction and TTL expiration
#[derive(Clone)]
pub struct HybridStore {
    inner: Arc<RwLock<StoreInner>>,
    capacity_kb: u64,
    sweep_interval: Duration,
    stop: Arc<Notify>,
}

impl HybridStore {
    pub fn new(capacity_kb: u64, sweep_interval: Duration) -> Self {
        info!(
            "Initializing hybrid store with capacity={}KB, sweep_interval={:?}",
            capacity_kb, sweep_interval
        );

        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                data: Trie::new(),
                order: VecDeque::new(),
                used_kb: 0,
            })),
            capacity_kb,
            sweep_interval,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Start the background expiration sweep task
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        info!("Starting expiration sweeper (interval={:?})", self.sweep_interval);

        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.sweep();
                    }
                    _ = store.stop.notified() => break,
                }
            }
        })
    }

    /// Insert or overwrite an entry
    ///
    /// An entry whose declared size exceeds the total capacity is rejected;
    /// any other write succeeds, shedding least-recently-used entries until
    /// the capacity bound holds again. Victims are chosen purely by recency,
    /// whatever their remaining TTL.
    pub fn put(&self, key: &str, value: Vec<u8>, size_kb: u64, ttl: Duration) -> Result<()> {
        if size_kb > self.capacity_kb {
            return Err(CacheError::EntryTooLarge {
                size_kb,
                capacity_kb: self.capacity_kb,
            });
        }

        debug!("Cache PUT: {} ({}KB, ttl={:?})", key, size_kb, ttl);

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Some(entry) = inner.data.get_mut(key) {
            // Overwrite in place: identity and creation time kept, accounting
            // adjusted by the size delta
            inner.used_kb = inner.used_kb - entry.size_kb + size_kb;
            entry.value = value;
            entry.size_kb = size_kb;
            entry.expires_at = Instant::now() + ttl;
            inner.order.retain(|k| k != key);
            inner.order.push_back(key.to_string());
        } else {
            inner
                .data
                .insert(key.to_string(), CacheEntry::new(value, size_kb, ttl));
            inner.order.push_back(key.to_string());
            inner.used_kb += size_kb;
        }

        while inner.used_kb > self.capacity_kb {
            let Some(victim) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.data.remove(&victim) {
                inner.used_kb -= evicted.size_kb;
                debug!("Cache EVICT: {} ({}KB)", victim, evicted.size_kb);
            }
        }

        Ok(())
    }

    /// Get a value by key, promoting it to most-recently-used
    ///
    /// Presence and expiration are tested under the shared section first; the
    /// exclusive section is only taken for promotion or expired-entry removal,
    /// and re-validates the key after the lock switch (a concurrent remove or
    /// eviction may have won the race).
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let inner = self.inner.read();
            if inner.data.get(key).is_none() {
                debug!("Cache MISS: {}", key);
                return None;
            }
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let expired = match inner.data.get(key) {
            None => {
                debug!("Cache MISS: {}", key);
                return None;
            }
            Some(entry) => entry.is_expired_at(Instant::now()),
        };

        if expired {
            if let Some(entry) = inner.data.remove(key) {
                inner.used_kb -= entry.size_kb;
            }
            inner.order.retain(|k| k != key);
            debug!("Cache MISS (expired): {}", key);
            return None;
        }

        inner.order.retain(|k| k != key);
        inner.order.push_back(key.to_string());
        debug!("Cache HIT: {}", key);

        inner.data.get(key).map(|entry| entry.value.clone())
    }

    /// Remove a key; no effect if absent
    pub fn remove(&self, key: &str) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Some(entry) = inner.data.remove(key) {
            inner.order.retain(|k| k != key);
            inner.used_kb -= entry.size_kb;
            debug!("Cache REMOVE: {}", key);
            true
        } else {
            false
        }
    }

    /// Remove every entry whose key starts with the given prefix
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let keys: Vec<String> = inner
            .data
            .get_raw_descendant(prefix)
            .map(|subtrie| subtrie.keys().map(|k| k.to_string()).collect())
            .unwrap_or_default();

        for key in &keys {
            if let Some(entry) = inner.data.remove(key) {
                inner.used_kb -= entry.size_kb;
            }
        }

        if !keys.is_empty() {
            let StoreInner { data, order, .. } = inner;
            order.retain(|k| data.get(k).is_some());
            debug!("Cache REMOVE PREFIX: {} ({} entries)", prefix, keys.len());
        }

        keys.len()
    }

    /// Remove every expired entry in one pass
    pub fn sweep(&self) -> usize {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let now = Instant::now();
        let expired: Vec<String> = inner
            .data
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            return 0;
        }

        for key in &expired {
            if let Some(entry) = inner.data.remove(key) {
                inner.used_kb -= entry.size_kb;
            }
        }

        let StoreInner { data, order, .. } = inner;
        order.retain(|k| data.get(k).is_some());

        debug!("Sweep removed {} expired entries", expired.len());
        expired.len()
    }

    /// Number of stored entries, including expired-but-unswept ones
    pub fn count(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Cumulative declared size in KB, including expired-but-unswept entries
    pub fn current_size_kb(&self) -> u64 {
        self.inner.read().used_kb
    }

    /// Value, declared size, and residual TTL of an unexpired entry
    ///
    /// Does not promote recency; expired and absent keys both yield `None`.
    pub fn entry_snapshot(&self, key: &str) -> Option<EntrySnapshot> {
        let inner = self.inner.read();
        let entry = inner.data.get(key)?;
        let now = Instant::now();
        if entry.is_expired_at(now) {
            return None;
        }
        Some(EntrySnapshot {
            value: entry.value.clone(),
            size_kb: entry.size_kb,
            residual_ttl: entry.expires_at.duration_since(now),
        })
    }

    /// Stop the periodic sweep; all other operations remain usable
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }
}
