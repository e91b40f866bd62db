//! Authorizer manager
//!
//! The [`Manager`] is the single entry point for the gateway adapter:
//!
//! - [`Manager::get_system_configuration`] fetches a service's proxy
//!   configuration from the control plane, through the cache when one is
//!   configured.
//! - [`Manager::auth_rep`] authorizes a request and reports its usage, either
//!   directly or through a per-destination buffered backend.
//! - [`Manager::shutdown`] drains buffered usage and stops background loops.
//!
//! Which paths are used is fixed at construction; nothing is re-checked per
//! call. A `Manager` must be constructed inside a Tokio runtime because the
//! cache refresh loop is spawned immediately.

mod refresh;
mod registry;
mod request;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use registry::BackendCacheRegistry;
pub use request::*;

use crate::cache::{CacheKey, CachedConfig, SystemCache};
use crate::config::AuthorizerConfig;
use crate::error::{AuthorizerError, FetchPhase};
use crate::observability::{CacheName, MetricsReporter, NoopReporter};
use crate::services::backend::{AuthBackend, AuthRepRequest, FailClosed, FailurePolicy};
use crate::services::system::{ProxyConfig, RetryPolicy};
use crate::services::{ClientBuilder, HttpClientBuilder};
use refresh::{ConfigRefresher, fetch_remotely};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// Backend dispatch settings
#[derive(Clone)]
pub struct BackendConfig {
    pub enable_caching: bool,
    /// How often each cached backend reports buffered usage; zero selects the default
    pub cache_flush_interval: Duration,
    pub failure_policy: Arc<dyn FailurePolicy>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enable_caching: false,
            cache_flush_interval: DEFAULT_FLUSH_INTERVAL,
            failure_policy: Arc::new(FailClosed),
        }
    }
}

impl BackendConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.cache_flush_interval.is_zero() {
            self.cache_flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        self
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("enable_caching", &self.enable_caching)
            .field("cache_flush_interval", &self.cache_flush_interval)
            .field("failure_policy", &self.failure_policy.name())
            .finish()
    }
}

enum ConfigSource {
    Remote,
    Cached(SystemCache),
}

enum BackendDispatch {
    Direct,
    Cached(BackendCacheRegistry),
}

pub struct Manager {
    builder: Arc<dyn ClientBuilder>,
    config_source: ConfigSource,
    backends: BackendDispatch,
    reporter: Arc<dyn MetricsReporter>,
    refresh_loop: Mutex<Option<JoinHandle<()>>>,
    /// Set once the drain has completed; concurrent callers wait on it
    shutdown: OnceCell<()>,
}

impl Manager {
    /// Wire a manager from its collaborators.
    ///
    /// With `system_cache` present the refresh loop starts now. A missing
    /// `reporter` discards all metrics.
    pub fn new(
        builder: Arc<dyn ClientBuilder>,
        system_cache: Option<SystemCache>,
        backend_config: BackendConfig,
        reporter: Option<Arc<dyn MetricsReporter>>,
    ) -> Self {
        let reporter = reporter.unwrap_or_else(|| Arc::new(NoopReporter));
        let backend_config = backend_config.with_defaults();

        let refresh_loop = system_cache.as_ref().map(SystemCache::spawn_refresh_loop);
        let config_source = match system_cache {
            Some(cache) => ConfigSource::Cached(cache),
            None => ConfigSource::Remote,
        };

        let backends = if backend_config.enable_caching {
            BackendDispatch::Cached(BackendCacheRegistry::new(
                builder.clone(),
                backend_config.failure_policy.clone(),
                backend_config.cache_flush_interval,
            ))
        } else {
            BackendDispatch::Direct
        };

        info!(
            system_cache = matches!(config_source, ConfigSource::Cached(_)),
            backend_caching = backend_config.enable_caching,
            "Authorizer manager created"
        );

        Self {
            builder,
            config_source,
            backends,
            reporter,
            refresh_loop: Mutex::new(refresh_loop),
            shutdown: OnceCell::new(),
        }
    }

    /// Manager whose clients share `http`'s connection pool
    pub fn with_http_client(
        http: reqwest::Client,
        system_cache: Option<SystemCache>,
        backend_config: BackendConfig,
        reporter: Option<Arc<dyn MetricsReporter>>,
    ) -> Self {
        let reporter = reporter.unwrap_or_else(|| Arc::new(NoopReporter));
        let builder = Arc::new(HttpClientBuilder::new(http, reporter.clone()));
        Self::new(builder, system_cache, backend_config, Some(reporter))
    }

    /// Manager built from loaded configuration
    pub fn from_config(
        config: &AuthorizerConfig,
        reporter: Option<Arc<dyn MetricsReporter>>,
    ) -> Result<Self, AuthorizerError> {
        let reporter = reporter.unwrap_or_else(|| Arc::new(NoopReporter));
        let builder = Arc::new(HttpClientBuilder::from_settings(
            &config.http,
            reporter.clone(),
        )?);
        let system_cache = config
            .system_cache
            .enabled
            .then(|| SystemCache::new(config.system_cache.to_cache_config()));

        Ok(Self::new(
            builder,
            system_cache,
            config.backend.to_backend_config(),
            Some(reporter),
        ))
    }

    /// Latest proxy configuration for `request.service_id` at `location`.
    ///
    /// The request is validated before any remote call. Cache hits are
    /// reported to the metrics reporter; misses fetch remotely and store the
    /// result with a refresher bound to this request's credentials.
    pub async fn get_system_configuration(
        &self,
        location: &str,
        request: SystemRequest,
    ) -> Result<ProxyConfig, AuthorizerError> {
        request.validate()?;

        match &self.config_source {
            ConfigSource::Remote => {
                fetch_remotely(self.builder.as_ref(), location, &request, FetchPhase::Remote).await
            }
            ConfigSource::Cached(system_cache) => {
                self.fetch_through_cache(system_cache, location, request)
                    .await
            }
        }
    }

    async fn fetch_through_cache(
        &self,
        system_cache: &SystemCache,
        location: &str,
        request: SystemRequest,
    ) -> Result<ProxyConfig, AuthorizerError> {
        let key = CacheKey::new(location, &request.service_id);

        if let Some(config) = system_cache.cache().get(&key).await {
            debug!(key = %key, version = config.version, "Configuration cache hit");
            self.reporter.cache_hit(CacheName::System);
            return Ok(config);
        }

        debug!(key = %key, "Configuration cache miss");
        let config =
            fetch_remotely(self.builder.as_ref(), location, &request, FetchPhase::CacheFill)
                .await?;

        let retry = RetryPolicy::new(system_cache.config().num_retry_failed_refresh);
        let refresher = ConfigRefresher::new(self.builder.clone(), location, request, retry);
        system_cache
            .cache()
            .set(key, CachedConfig::new(config.clone(), Arc::new(refresher)))
            .await;

        Ok(config)
    }

    /// Authorize a request against `destination` and report its usage.
    ///
    /// With backend caching, usage is buffered in the destination's cached
    /// backend. If that backend cannot be created the call is made directly
    /// instead and the creation error is logged and counted.
    pub async fn auth_rep(
        &self,
        destination: &str,
        request: BackendRequest,
    ) -> Result<BackendResponse, AuthorizerError> {
        let api_request = request.to_api_request()?;

        match &self.backends {
            BackendDispatch::Direct => self.direct_auth_rep(destination, api_request).await,
            BackendDispatch::Cached(registry) => match registry.get_or_create(destination).await {
                Ok(backend) => {
                    let result = call_backend(backend.as_ref(), api_request).await;
                    // Shutdown overtook this call: its final flush may have run
                    // before the usage was buffered.
                    if registry.is_shut_down().await {
                        let summary = backend.flush().await;
                        debug!(
                            destination = %destination,
                            reported = summary.reported,
                            "Flushed usage buffered during shutdown"
                        );
                    }
                    result
                }
                Err(e) => {
                    warn!(
                        destination = %destination,
                        error = %e,
                        "Unable to create cached backend, falling back to direct call"
                    );
                    self.reporter.backend_creation_failed(destination);
                    self.direct_auth_rep(destination, api_request).await
                }
            },
        }
    }

    async fn direct_auth_rep(
        &self,
        destination: &str,
        request: AuthRepRequest,
    ) -> Result<BackendResponse, AuthorizerError> {
        let backend = self.builder.build_backend_client(destination)?;
        call_backend(backend.as_ref(), request).await
    }

    /// Drain buffered usage, then stop the configuration refresh loop.
    ///
    /// Every flush loop performs one final flush and exits before the
    /// refresh loop is stopped; both are awaited before this returns.
    /// Later or concurrent calls wait for the first one to finish and do
    /// nothing else.
    pub async fn shutdown(&self) {
        if self.shutdown.initialized() {
            debug!("Shutdown already performed");
            return;
        }
        self.shutdown.get_or_init(|| self.drain_and_stop()).await;
    }

    async fn drain_and_stop(&self) {
        info!("Shutting down authorizer manager");

        if let BackendDispatch::Cached(registry) = &self.backends {
            registry.shutdown().await;
        }

        if let ConfigSource::Cached(system_cache) = &self.config_source {
            system_cache.stop_refreshing();
            if let Some(handle) = self.refresh_loop.lock().await.take() {
                if let Err(e) = handle.await {
                    error!(error = %e, "Refresh loop terminated abnormally");
                }
            }
        }

        info!("Authorizer manager shut down");
    }

    /// True once [`Manager::shutdown`] has completed
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.initialized()
    }

    pub fn system_cache(&self) -> Option<&SystemCache> {
        match &self.config_source {
            ConfigSource::Cached(cache) => Some(cache),
            ConfigSource::Remote => None,
        }
    }

    /// Number of destinations with a cached backend
    pub async fn cached_backend_count(&self) -> usize {
        match &self.backends {
            BackendDispatch::Cached(registry) => registry.len().await,
            BackendDispatch::Direct => 0,
        }
    }
}

async fn call_backend(
    backend: &dyn AuthBackend,
    request: AuthRepRequest,
) -> Result<BackendResponse, AuthorizerError> {
    backend
        .authorize_and_report(request)
        .await
        .map(BackendResponse::from)
        .map_err(|source| {
            let response = BackendResponse {
                authorized: false,
                raw_response: source.raw_response().map(str::to_string),
                ..Default::default()
            };
            AuthorizerError::BackendCall {
                source,
                response: Box::new(response),
            }
        })
}
