//! Control-plane ("system") configuration client
//!
//! Fetches the latest promoted proxy configuration of a service:
//! `GET {location}/admin/api/services/{id}/proxy/configs/{env}/latest.json`.

pub mod retry;
pub mod types;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

pub use retry::RetryPolicy;
pub use types::*;

use crate::error::AuthorizerError;
use crate::logging::redact_credentials;
use crate::observability::{MetricsReporter, ResponseObservation, Target};

use super::parse_endpoint;

const LATEST_CONFIG_ENDPOINT: &str = "proxy_config_latest";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),
    /// Non-success status; the body is kept for diagnostics
    #[error("Unexpected status {status} from control plane")]
    UnexpectedStatus { status: u16, body: String },
    /// The response body was not a proxy configuration
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Source of proxy configurations for a single control-plane tenant
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch_latest(
        &self,
        service_id: &str,
        environment: &str,
    ) -> Result<ProxyConfig, SystemError>;
}

/// HTTP client for one control-plane location and access token
pub struct HttpSystemClient {
    http: reqwest::Client,
    base: Url,
    access_token: String,
    reporter: Arc<dyn MetricsReporter>,
}

impl fmt::Debug for HttpSystemClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSystemClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpSystemClient {
    pub fn new(
        http: reqwest::Client,
        location: &str,
        access_token: &str,
        reporter: Arc<dyn MetricsReporter>,
    ) -> Result<Self, AuthorizerError> {
        let base = parse_endpoint(location).map_err(|reason| AuthorizerError::ClientBuild {
            target: "system".to_string(),
            reason,
        })?;

        Ok(Self {
            http,
            base,
            access_token: access_token.to_string(),
            reporter,
        })
    }

    fn latest_url(&self, service_id: &str, environment: &str) -> Result<Url, SystemError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SystemError::Transport("location cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend([
                "admin",
                "api",
                "services",
                service_id,
                "proxy",
                "configs",
                environment,
                "latest.json",
            ]);
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }
}

#[async_trait]
impl ConfigFetcher for HttpSystemClient {
    async fn fetch_latest(
        &self,
        service_id: &str,
        environment: &str,
    ) -> Result<ProxyConfig, SystemError> {
        let url = self.latest_url(service_id, environment)?;
        debug!(url = %redact_credentials(url.as_str()), "Fetching latest proxy configuration");

        let started = Instant::now();
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SystemError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        self.reporter.observe_response(&ResponseObservation {
            target: Target::System,
            endpoint: LATEST_CONFIG_ENDPOINT,
            status: status.as_u16(),
            duration: started.elapsed(),
        });

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SystemError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let element: ProxyConfigElement = response
            .json()
            .await
            .map_err(|e| SystemError::Decode(e.without_url().to_string()))?;

        Ok(element.proxy_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::NoopReporter;

    fn client(location: &str) -> HttpSystemClient {
        HttpSystemClient::new(
            reqwest::Client::new(),
            location,
            "s3cret",
            Arc::new(NoopReporter),
        )
        .expect("valid location")
    }

    #[test]
    fn test_latest_url_layout() {
        let url = client("https://tenant-admin.example.com")
            .latest_url("42", "production")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://tenant-admin.example.com/admin/api/services/42/proxy/configs/production/latest.json?access_token=s3cret"
        );
    }

    #[test]
    fn test_latest_url_keeps_base_path_and_escapes_segments() {
        let url = client("https://cp.example.com/tenant/")
            .latest_url("a/b", "staging")
            .unwrap();
        assert_eq!(
            url.path(),
            "/tenant/admin/api/services/a%2Fb/proxy/configs/staging/latest.json"
        );
    }

    #[test]
    fn test_invalid_location_rejected() {
        let err = HttpSystemClient::new(
            reqwest::Client::new(),
            "not a url",
            "token",
            Arc::new(NoopReporter),
        )
        .unwrap_err();
        assert!(matches!(err, AuthorizerError::ClientBuild { .. }));
    }

    #[test]
    fn test_debug_hides_access_token() {
        let rendered = format!("{:?}", client("https://cp.example.com"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_system_error_display() {
        let err = SystemError::UnexpectedStatus {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "Unexpected status 403 from control plane");
    }
}
