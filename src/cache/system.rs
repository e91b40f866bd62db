//! Cache plus the background loop that keeps it fresh

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::{ConfigCacheConfig, ConfigurationCache, InMemoryConfigCache};

/// Configuration cache owned by a manager.
///
/// Dropping the `SystemCache` closes the stop channel, which also ends the
/// refresh loop.
pub struct SystemCache {
    cache: Arc<dyn ConfigurationCache>,
    config: ConfigCacheConfig,
    stop_refreshing: watch::Sender<bool>,
}

impl SystemCache {
    /// In-memory cache sized by `config`; zero values select the defaults
    pub fn new(config: ConfigCacheConfig) -> Self {
        let config = config.with_defaults();
        let cache = Arc::new(InMemoryConfigCache::new(config.clone()));
        Self::with_cache(cache, config)
    }

    /// Wrap a caller-supplied cache implementation
    pub fn with_cache(cache: Arc<dyn ConfigurationCache>, config: ConfigCacheConfig) -> Self {
        let (stop_refreshing, _) = watch::channel(false);
        Self {
            cache,
            config: config.with_defaults(),
            stop_refreshing,
        }
    }

    pub fn cache(&self) -> &Arc<dyn ConfigurationCache> {
        &self.cache
    }

    pub fn config(&self) -> &ConfigCacheConfig {
        &self.config
    }

    pub fn refresh_interval(&self) -> Duration {
        self.config.refresh_interval
    }

    /// Start the periodic refresh sweep. The first sweep runs one interval from now.
    pub(crate) fn spawn_refresh_loop(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let period = self.config.refresh_interval;
        let mut stop = self.stop_refreshing.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                refresh_interval_secs = period.as_secs(),
                "Configuration refresh loop started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let summary = cache.refresh().await;
                        debug!(
                            refreshed = summary.refreshed,
                            failed = summary.failed,
                            expired = summary.expired,
                            "Configuration refresh sweep finished"
                        );
                    }
                    _ = wait_for_stop(&mut stop) => {
                        info!("Configuration refresh loop stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Signal the refresh loop to exit after any sweep in progress
    pub(crate) fn stop_refreshing(&self) {
        self.stop_refreshing.send_replace(true);
    }
}

/// Resolves once the stop flag is set or its sender is gone
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CachedConfig, Refresh};
    use crate::error::AuthorizerError;
    use crate::services::system::ProxyConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter(AtomicU32);

    #[async_trait]
    impl Refresh for Counter {
        async fn refresh(&self) -> Result<ProxyConfig, AuthorizerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ProxyConfig::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_ticks_until_stopped() {
        let system_cache = SystemCache::new(ConfigCacheConfig {
            max_size: 10,
            num_retry_failed_refresh: 0,
            refresh_interval: Duration::from_secs(10),
            ttl: Duration::from_secs(15),
        });
        let counter = Arc::new(Counter(AtomicU32::new(0)));
        system_cache
            .cache()
            .set(
                CacheKey::new("https://cp", "1"),
                CachedConfig::new(ProxyConfig::default(), counter.clone()),
            )
            .await;

        let handle = system_cache.spawn_refresh_loop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        system_cache.stop_refreshing();
        handle.await.expect("refresh loop exits cleanly");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_cache_ends_loop() {
        let system_cache = SystemCache::new(ConfigCacheConfig::default());
        let handle = system_cache.spawn_refresh_loop();
        drop(system_cache);
        handle.await.expect("refresh loop exits when sender is dropped");
    }
}
