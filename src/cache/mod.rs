//! Control-plane configuration cache
//!
//! Entries are keyed by (control-plane location, service id) and carry the
//! [`Refresh`] handle that can re-fetch them. A background sweep, owned by
//! [`SystemCache`], purges expired entries and refreshes the ones about to
//! expire so hot services rarely pay for a remote fetch.

pub mod memory;
pub mod system;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use memory::InMemoryConfigCache;
pub use system::SystemCache;

use crate::error::AuthorizerError;
use crate::services::system::ProxyConfig;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(180);
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    location: String,
    service_id: String,
}

impl CacheKey {
    pub fn new(location: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            service_id: service_id.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.location, self.service_id)
    }
}

/// Re-fetches the value behind one cache entry
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self) -> Result<ProxyConfig, AuthorizerError>;
}

/// A cached configuration and the means to refresh it
#[derive(Clone)]
pub struct CachedConfig {
    pub item: ProxyConfig,
    refresher: Arc<dyn Refresh>,
}

impl CachedConfig {
    pub fn new(item: ProxyConfig, refresher: Arc<dyn Refresh>) -> Self {
        Self { item, refresher }
    }

    pub fn refresher(&self) -> Arc<dyn Refresh> {
        self.refresher.clone()
    }
}

impl fmt::Debug for CachedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedConfig")
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

/// Sizing and timing for the configuration cache.
///
/// Zero values are replaced with the defaults by [`ConfigCacheConfig::with_defaults`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCacheConfig {
    pub max_size: usize,
    /// Retries after a failed refresh, per entry per sweep
    pub num_retry_failed_refresh: u32,
    pub refresh_interval: Duration,
    pub ttl: Duration,
}

impl Default for ConfigCacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            num_retry_failed_refresh: 0,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            ttl: DEFAULT_TTL,
        }
    }
}

impl ConfigCacheConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_size == 0 {
            self.max_size = DEFAULT_MAX_SIZE;
        }
        if self.refresh_interval.is_zero() {
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }
        if self.ttl.is_zero() {
            self.ttl = DEFAULT_TTL;
        }
        self
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Current number of cached entries
    pub entries: u64,
    /// Entries evicted due to capacity
    pub evictions: u64,
    /// Entries dropped due to TTL
    pub expired: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}

impl CacheStats {
    /// Hit rate as percentage (0.0 - 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Outcome of one refresh sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub expired: usize,
    /// Entries removed while their refresh was in flight
    pub skipped: usize,
}

#[async_trait]
pub trait ConfigurationCache: Send + Sync {
    /// Unexpired value for `key`
    async fn get(&self, key: &CacheKey) -> Option<ProxyConfig>;

    /// Insert or replace an entry, starting a fresh TTL
    async fn set(&self, key: CacheKey, value: CachedConfig);

    /// Purge expired entries and refresh those close to expiry
    async fn refresh(&self) -> RefreshSummary;

    async fn remove(&self, key: &CacheKey) -> bool;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
