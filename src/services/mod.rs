//! Remote clients and the factory that builds them
//!
//! The manager never constructs clients itself; it asks a [`ClientBuilder`]
//! so tests and embedders can substitute their own transports.

pub mod backend;
pub mod system;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::config::HttpSettings;
use crate::error::AuthorizerError;
use crate::observability::MetricsReporter;

use backend::{AuthBackend, BufferedBackend, FailurePolicy, HttpBackendClient};
use system::{ConfigFetcher, HttpSystemClient};

/// Parse and sanity-check a remote base URL
pub(crate) fn parse_endpoint(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL {raw:?}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("URL {raw:?} has no host"));
    }
    Ok(url)
}

pub trait ClientBuilder: Send + Sync {
    /// Control-plane client for one location and access token
    fn build_system_client(
        &self,
        location: &str,
        access_token: &str,
    ) -> Result<Arc<dyn ConfigFetcher>, AuthorizerError>;

    /// Direct backend client, one round trip per call
    fn build_backend_client(
        &self,
        destination: &str,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError>;

    /// Backend client that buffers usage until flushed
    fn build_cached_backend(
        &self,
        destination: &str,
        policy: Arc<dyn FailurePolicy>,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError>;
}

/// Builds HTTP clients that share one connection pool
#[derive(Clone)]
pub struct HttpClientBuilder {
    http: reqwest::Client,
    reporter: Arc<dyn MetricsReporter>,
}

impl HttpClientBuilder {
    pub fn new(http: reqwest::Client, reporter: Arc<dyn MetricsReporter>) -> Self {
        Self { http, reporter }
    }

    pub fn from_settings(
        settings: &HttpSettings,
        reporter: Arc<dyn MetricsReporter>,
    ) -> Result<Self, AuthorizerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthorizerError::Config(format!("unable to build HTTP client: {e}")))?;

        Ok(Self::new(http, reporter))
    }
}

impl ClientBuilder for HttpClientBuilder {
    fn build_system_client(
        &self,
        location: &str,
        access_token: &str,
    ) -> Result<Arc<dyn ConfigFetcher>, AuthorizerError> {
        let client =
            HttpSystemClient::new(self.http.clone(), location, access_token, self.reporter.clone())?;
        Ok(Arc::new(client))
    }

    fn build_backend_client(
        &self,
        destination: &str,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        let client = HttpBackendClient::new(self.http.clone(), destination, self.reporter.clone())?;
        Ok(Arc::new(client))
    }

    fn build_cached_backend(
        &self,
        destination: &str,
        policy: Arc<dyn FailurePolicy>,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        let transport = HttpBackendClient::new(self.http.clone(), destination, self.reporter.clone())
            .map_err(|e| AuthorizerError::BackendCreation {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Arc::new(BufferedBackend::new(
            destination,
            Arc::new(transport),
            policy,
        )))
    }
}
