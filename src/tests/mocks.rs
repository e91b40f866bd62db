//! Counting mocks for the manager's collaborators

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::AuthorizerError;
use crate::observability::{CacheName, MetricsReporter, ResponseObservation};
use crate::services::ClientBuilder;
use crate::services::backend::{
    AuthBackend, AuthRepRequest, AuthRepResponse, BackendError, BackendTransport, BufferedBackend,
    FailurePolicy, FlushSummary, ReportBatch,
};
use crate::services::system::{ConfigFetcher, ProxyConfig, SystemError};

/// Control plane that hands out increasing config versions
#[derive(Default)]
pub struct MockFetcher {
    pub calls: AtomicU32,
    pub failing: AtomicBool,
    version: AtomicI64,
}

impl MockFetcher {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigFetcher for MockFetcher {
    async fn fetch_latest(
        &self,
        service_id: &str,
        environment: &str,
    ) -> Result<ProxyConfig, SystemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SystemError::Transport("control plane unreachable".to_string()));
        }

        let mut config = ProxyConfig {
            version: self.version.fetch_add(1, Ordering::SeqCst) + 1,
            environment: environment.to_string(),
            ..Default::default()
        };
        config.content.proxy.service_id = service_id.parse().unwrap_or_default();
        Ok(config)
    }
}

/// Backend that records requests and counts flushes
#[derive(Default)]
pub struct MockBackend {
    pub calls: AtomicU32,
    pub flushes: AtomicU32,
    pub deny: AtomicBool,
    pub fail_with: Mutex<Option<BackendError>>,
    pub last_request: Mutex<Option<AuthRepRequest>>,
    /// Time each flush takes before it counts as done
    pub flush_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> u32 {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AuthRepRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn authorize_and_report(
        &self,
        request: AuthRepRequest,
    ) -> Result<AuthRepResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }
        let authorized = !self.deny.load(Ordering::SeqCst);
        Ok(AuthRepResponse {
            authorized,
            error_code: (!authorized).then(|| "user_key_invalid".to_string()),
            rejection_reason: None,
            raw_response: Some(format!("<status><authorized>{authorized}</authorized></status>")),
        })
    }

    async fn flush(&self) -> FlushSummary {
        let delay = *self.flush_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        FlushSummary::default()
    }
}

/// Builder that hands out the shared mocks and counts every build
#[derive(Default)]
pub struct MockClientBuilder {
    pub fetcher: Arc<MockFetcher>,
    pub direct: Arc<MockBackend>,
    pub cached: Arc<MockBackend>,
    pub system_builds: AtomicU32,
    pub direct_builds: AtomicU32,
    pub cached_builds: AtomicU32,
    pub fail_cached: AtomicBool,
    /// Blocking delay inside cached creation, widens race windows
    pub creation_delay: Option<Duration>,
}

impl MockClientBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_creation_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            creation_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn cached_builds(&self) -> u32 {
        self.cached_builds.load(Ordering::SeqCst)
    }

    pub fn direct_builds(&self) -> u32 {
        self.direct_builds.load(Ordering::SeqCst)
    }
}

impl ClientBuilder for MockClientBuilder {
    fn build_system_client(
        &self,
        _location: &str,
        _access_token: &str,
    ) -> Result<Arc<dyn ConfigFetcher>, AuthorizerError> {
        self.system_builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.fetcher.clone())
    }

    fn build_backend_client(
        &self,
        _destination: &str,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        self.direct_builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.direct.clone())
    }

    fn build_cached_backend(
        &self,
        destination: &str,
        _policy: Arc<dyn FailurePolicy>,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        self.cached_builds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.creation_delay {
            std::thread::sleep(delay);
        }
        if self.fail_cached.load(Ordering::SeqCst) {
            return Err(AuthorizerError::BackendCreation {
                destination: destination.to_string(),
                reason: "simulated creation failure".to_string(),
            });
        }
        Ok(self.cached.clone())
    }
}

#[derive(Default)]
pub struct CountingReporter {
    pub cache_hits: AtomicU32,
    pub responses: AtomicU32,
    pub creation_failures: AtomicU32,
}

impl MetricsReporter for CountingReporter {
    fn cache_hit(&self, _cache: CacheName) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    fn observe_response(&self, _observation: &ResponseObservation<'_>) {
        self.responses.fetch_add(1, Ordering::SeqCst);
    }

    fn backend_creation_failed(&self, _destination: &str) {
        self.creation_failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wire transport that authorizes everything and sums reported hits
#[derive(Default)]
pub struct CountingTransport {
    pub authorizations: AtomicU32,
    pub reports: AtomicU32,
    pub reported_hits: AtomicI64,
    /// When set, `authorize` parks until notified
    pub gate: Option<Arc<Notify>>,
}

#[async_trait]
impl BackendTransport for CountingTransport {
    async fn authorize(&self, _request: &AuthRepRequest) -> Result<AuthRepResponse, BackendError> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(AuthRepResponse {
            authorized: true,
            ..Default::default()
        })
    }

    async fn authrep(&self, request: &AuthRepRequest) -> Result<AuthRepResponse, BackendError> {
        self.authorize(request).await
    }

    async fn report(&self, batch: &ReportBatch) -> Result<(), BackendError> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        let hits = batch.usage.get("hits").copied().unwrap_or_default();
        self.reported_hits.fetch_add(hits, Ordering::SeqCst);
        Ok(())
    }
}

/// Builder whose cached backends are real [`BufferedBackend`]s
pub struct BufferingClientBuilder {
    pub transport: Arc<CountingTransport>,
    pub direct: Arc<MockBackend>,
}

impl BufferingClientBuilder {
    pub fn new(transport: CountingTransport) -> Arc<Self> {
        Arc::new(Self {
            transport: Arc::new(transport),
            direct: Arc::new(MockBackend::default()),
        })
    }
}

impl ClientBuilder for BufferingClientBuilder {
    fn build_system_client(
        &self,
        _location: &str,
        _access_token: &str,
    ) -> Result<Arc<dyn ConfigFetcher>, AuthorizerError> {
        Ok(Arc::new(MockFetcher::default()))
    }

    fn build_backend_client(
        &self,
        _destination: &str,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        Ok(self.direct.clone())
    }

    fn build_cached_backend(
        &self,
        destination: &str,
        policy: Arc<dyn FailurePolicy>,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        Ok(Arc::new(BufferedBackend::new(
            destination,
            self.transport.clone(),
            policy,
        )))
    }
}
