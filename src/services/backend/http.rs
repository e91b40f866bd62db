//! HTTP transport for the backend endpoints
//!
//! Outcomes are decided from the status line and headers:
//! - 2xx: authorized (report: accepted)
//! - 403, 404, 409: not authorized, reason from `3scale-rejection-reason`
//! - anything else: [`BackendError::UnexpectedStatus`]
//!
//! The raw body is always kept so callers can inspect the backend's answer.

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{RequestBuilder, Response, Url};
use tokio::time::Instant;
use tracing::debug;

use super::{
    AuthBackend, AuthRepRequest, AuthRepResponse, BackendError, BackendTransport, EXTENSIONS_HEADER,
    REJECTION_REASON_HEADER, ReportBatch, Transaction,
};
use crate::error::AuthorizerError;
use crate::logging::redact_credentials;
use crate::observability::{MetricsReporter, ResponseObservation, Target};
use crate::services::parse_endpoint;

const AUTHORIZE_PATH: &str = "transactions/authorize.xml";
const AUTHREP_PATH: &str = "transactions/authrep.xml";
const REPORT_PATH: &str = "transactions.xml";

static REASON_PATTERN: OnceLock<Regex> = OnceLock::new();

fn reason_pattern() -> &'static Regex {
    REASON_PATTERN.get_or_init(|| {
        Regex::new(r"<reason>([^<]*)</reason>|<error[^>]*>([^<]*)</error>")
            .expect("reason pattern compiles")
    })
}

/// Human-readable rejection text from an XML response body
fn extract_reason(body: &str) -> Option<String> {
    let captures = reason_pattern().captures(body)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|reason| !reason.is_empty())
}

/// Direct HTTP client for one backend destination
pub struct HttpBackendClient {
    http: reqwest::Client,
    base: Url,
    reporter: Arc<dyn MetricsReporter>,
}

impl fmt::Debug for HttpBackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackendClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpBackendClient {
    pub fn new(
        http: reqwest::Client,
        destination: &str,
        reporter: Arc<dyn MetricsReporter>,
    ) -> Result<Self, AuthorizerError> {
        let base = parse_endpoint(destination).map_err(|reason| AuthorizerError::ClientBuild {
            target: "backend".to_string(),
            reason,
        })?;

        Ok(Self {
            http,
            base,
            reporter,
        })
    }

    pub fn destination(&self) -> &str {
        self.base.as_str()
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidRequest("destination cannot carry a path".into()))?
            .pop_if_empty()
            .extend(path.split('/'));
        Ok(url)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        self.reporter.observe_response(&ResponseObservation {
            target: Target::Backend,
            endpoint,
            status: response.status().as_u16(),
            duration: started.elapsed(),
        });
        Ok(response)
    }

    async fn query_call(
        &self,
        endpoint: &'static str,
        path: &str,
        request: &AuthRepRequest,
    ) -> Result<AuthRepResponse, BackendError> {
        let transaction = request.transactions.first().ok_or_else(|| {
            BackendError::InvalidRequest("request carries no transactions".into())
        })?;

        let mut url = self.endpoint_url(path)?;
        url.query_pairs_mut()
            .extend_pairs(query_pairs(request, transaction));
        debug!(url = %redact_credentials(url.as_str()), "Calling backend");

        let mut builder = self.http.get(url);
        if let Some(extensions) = request.extensions_header() {
            builder = builder.header(EXTENSIONS_HEADER, extensions);
        }

        let response = self.send(endpoint, builder).await?;
        interpret(response).await
    }
}

fn query_pairs(request: &AuthRepRequest, transaction: &Transaction) -> Vec<(String, String)> {
    let mut pairs = vec![
        (request.auth.auth_type.clone(), request.auth.value.clone()),
        ("service_id".to_string(), request.service.clone()),
    ];
    pairs.extend(
        transaction
            .params
            .pairs()
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );

    let mut usage: Vec<_> = transaction.metrics.iter().collect();
    usage.sort();
    pairs.extend(
        usage
            .into_iter()
            .map(|(metric, delta)| (format!("usage[{metric}]"), delta.to_string())),
    );
    pairs
}

fn report_pairs(batch: &ReportBatch) -> Vec<(String, String)> {
    let mut pairs = vec![
        (batch.auth.auth_type.clone(), batch.auth.value.clone()),
        ("service_id".to_string(), batch.service.clone()),
    ];
    pairs.extend(
        batch
            .params
            .pairs()
            .map(|(name, value)| (format!("transactions[0][{name}]"), value.to_string())),
    );

    let mut usage: Vec<_> = batch.usage.iter().collect();
    usage.sort();
    pairs.extend(usage.into_iter().map(|(metric, delta)| {
        (
            format!("transactions[0][usage][{metric}]"),
            delta.to_string(),
        )
    }));
    pairs
}

async fn interpret(response: Response) -> Result<AuthRepResponse, BackendError> {
    let status = response.status().as_u16();
    let error_code = response
        .headers()
        .get(REJECTION_REASON_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.ok().filter(|body| !body.is_empty());

    match status {
        200..=299 => Ok(AuthRepResponse {
            authorized: true,
            error_code: None,
            rejection_reason: None,
            raw_response: body,
        }),
        403 | 404 | 409 => Ok(AuthRepResponse {
            authorized: false,
            rejection_reason: body.as_deref().and_then(extract_reason),
            error_code,
            raw_response: body,
        }),
        _ => Err(BackendError::UnexpectedStatus {
            status,
            raw_response: body,
        }),
    }
}

#[async_trait]
impl BackendTransport for HttpBackendClient {
    async fn authorize(&self, request: &AuthRepRequest) -> Result<AuthRepResponse, BackendError> {
        self.query_call("authorize", AUTHORIZE_PATH, request).await
    }

    async fn authrep(&self, request: &AuthRepRequest) -> Result<AuthRepResponse, BackendError> {
        self.query_call("authrep", AUTHREP_PATH, request).await
    }

    async fn report(&self, batch: &ReportBatch) -> Result<(), BackendError> {
        let url = self.endpoint_url(REPORT_PATH)?;
        let builder = self.http.post(url).form(&report_pairs(batch));

        let response = self.send("report", builder).await?;
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(());
        }
        let body = response.text().await.ok().filter(|body| !body.is_empty());
        Err(BackendError::UnexpectedStatus {
            status,
            raw_response: body,
        })
    }
}

#[async_trait]
impl AuthBackend for HttpBackendClient {
    async fn authorize_and_report(
        &self,
        request: AuthRepRequest,
    ) -> Result<AuthRepResponse, BackendError> {
        self.authrep(&request).await
    }
}
