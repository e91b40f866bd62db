//! In-memory configuration cache with TTL expiry and LRU eviction

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    CacheKey, CacheStats, CachedConfig, ConfigCacheConfig, ConfigurationCache, RefreshSummary,
};
use crate::services::system::ProxyConfig;

#[derive(Clone, Debug)]
struct CacheEntry {
    value: CachedConfig,
    expires_at: Instant,
    /// When this entry was last read or written (for LRU)
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(value: CachedConfig, ttl: std::time::Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now + ttl,
            last_accessed: now,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// Thread-safe cache backed by a `HashMap`.
///
/// Expired entries are never returned; they are dropped lazily on read and
/// eagerly by [`ConfigurationCache::refresh`].
#[derive(Clone)]
pub struct InMemoryConfigCache {
    config: ConfigCacheConfig,
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl InMemoryConfigCache {
    pub fn new(config: ConfigCacheConfig) -> Self {
        Self {
            config: config.with_defaults(),
            entries: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    pub fn config(&self) -> &ConfigCacheConfig {
        &self.config
    }

    /// Evict least recently used entries until within `max_size`, sparing `keep`
    fn evict_over_capacity(
        &self,
        entries: &mut HashMap<CacheKey, CacheEntry>,
        keep: &CacheKey,
    ) -> u64 {
        if entries.len() <= self.config.max_size {
            return 0;
        }

        let mut candidates: Vec<_> = entries
            .iter()
            .filter(|(key, _)| *key != keep)
            .map(|(key, entry)| (key.clone(), entry.last_accessed))
            .collect();
        candidates.sort_by_key(|(_, last_accessed)| *last_accessed);

        let to_evict = entries.len() - self.config.max_size;
        let mut evicted = 0;
        for (key, _) in candidates.into_iter().take(to_evict) {
            debug!(key = %key, "Evicting least recently used configuration");
            entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

#[async_trait]
impl ConfigurationCache for InMemoryConfigCache {
    async fn get(&self, key: &CacheKey) -> Option<ProxyConfig> {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.touch();
                stats.hits += 1;
                Some(entry.value.item.clone())
            }
            Some(_) => {
                entries.remove(key);
                stats.expired += 1;
                stats.misses += 1;
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    async fn set(&self, key: CacheKey, value: CachedConfig) {
        let mut entries = self.entries.write().await;
        entries.insert(key.clone(), CacheEntry::new(value, self.config.ttl));

        let evicted = self.evict_over_capacity(&mut entries, &key);
        if evicted > 0 {
            self.stats.write().await.evictions += evicted;
        }
    }

    async fn refresh(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let now = Instant::now();
        let horizon = now + self.config.refresh_interval;

        // Collect work under the lock, run refreshers without it
        let due = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            summary.expired = before - entries.len();

            entries
                .iter()
                .filter(|(_, entry)| entry.expires_at <= horizon)
                .map(|(key, entry)| (key.clone(), entry.value.refresher()))
                .collect::<Vec<_>>()
        };

        for (key, refresher) in due {
            match refresher.refresh().await {
                Ok(item) => {
                    let mut entries = self.entries.write().await;
                    match entries.get_mut(&key) {
                        Some(entry) => {
                            entry.value.item = item;
                            entry.expires_at = Instant::now() + self.config.ttl;
                            summary.refreshed += 1;
                        }
                        None => summary.skipped += 1,
                    }
                }
                Err(error) => {
                    warn!(
                        key = %key,
                        error = %error,
                        "Configuration refresh failed, serving cached value until expiry"
                    );
                    summary.failed += 1;
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.expired += summary.expired as u64;
        stats.refreshes += summary.refreshed as u64;
        stats.refresh_failures += summary.failed as u64;

        summary
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await.len() as u64;
        let mut result = self.stats.read().await.clone();
        result.entries = entries;
        result
    }
}
