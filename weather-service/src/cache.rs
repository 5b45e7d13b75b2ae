//! Process-local expiring key/value store.
//!
//! Every entry carries its own deadline. Reads past the deadline behave as a
//! miss and evict the entry; [`MemoryCache::spawn_sweeper`] bounds memory held
//! by entries nobody reads again.

use common::models::CacheStats;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

/// Longest lifetime an entry can get; larger TTLs are clamped to it.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: Counters,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "Cache HIT");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "Cache MISS");
                    return None;
                }
            }
        }

        // Expired: evict under the write lock, unless a writer refreshed it meanwhile.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(Instant::now()) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            entries.remove(key);
            debug!(key, "Cache EXPIRED");
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache SET");
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: deadline_after(ttl),
            },
        );
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            debug!(key, "Cache DEL");
        }
        removed
    }

    /// Drop every entry and reset the counters.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.sets.store(0, Ordering::Relaxed);
        info!("Cache cleared");
    }

    /// Live keys containing `pattern`.
    pub async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.contains(pattern) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remove every key containing `pattern`, returning how many went.
    pub async fn clear_matching(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let cleared = before - entries.len();
        if cleared > 0 {
            info!(cleared, pattern, "Cleared keys matching pattern");
        }
        cleared
    }

    /// Evict every expired entry.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let cleaned = before - entries.len();
        if cleaned > 0 {
            info!(cleaned, "Cleaned up expired cache entries");
        }
        cleaned
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            keys: self.entries.read().await.len(),
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Round-trip a sentinel entry through the store. A caller's entry under the
    /// sentinel key is read instead of overwritten.
    pub async fn is_healthy(&self) -> bool {
        const SENTINEL_KEY: &str = "__cache_health_check__";
        let sentinel = Value::String("ok".to_string());

        let inserted = {
            let mut entries = self.entries.write().await;
            if entries.contains_key(SENTINEL_KEY) {
                false
            } else {
                entries.insert(
                    SENTINEL_KEY.to_string(),
                    CacheEntry {
                        value: sentinel.clone(),
                        expires_at: deadline_after(Duration::from_secs(1)),
                    },
                );
                true
            }
        };

        let read_back = self
            .entries
            .read()
            .await
            .get(SENTINEL_KEY)
            .map(|entry| entry.value.clone());

        if !inserted {
            return read_back.is_some();
        }
        self.entries.write().await.remove(SENTINEL_KEY);
        read_back == Some(sentinel)
    }

    /// Run [`sweep`](Self::sweep) every `period` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = cancel.cancelled() => {
                        debug!("Memory cache sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}
