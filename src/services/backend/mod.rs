//! Backend (usage authorization and reporting) clients
//!
//! Two seams live here:
//! - [`BackendTransport`]: the three raw endpoints (authorize, authrep, report)
//! - [`AuthBackend`]: what the manager calls; either a direct client that
//!   does authrep in one round trip, or a [`BufferedBackend`] that authorizes
//!   remotely and reports usage in periodic batches.

pub mod buffered;
pub mod http;
pub mod policy;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use buffered::{BufferedBackend, ReportBuffer};
pub use http::HttpBackendClient;
pub use policy::{FailClosed, FailOpen, FailurePolicy, FailurePolicyKind, PolicyDecision};
pub use types::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),
    /// Status outside the documented set; the body is kept when readable
    #[error("Unexpected status {status} from backend")]
    UnexpectedStatus {
        status: u16,
        raw_response: Option<String>,
    },
    /// The request could not be expressed on the wire
    #[error("Invalid backend request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            BackendError::UnexpectedStatus { raw_response, .. } => raw_response.as_deref(),
            _ => None,
        }
    }

    /// Whether the failure means the backend could not answer at all
    pub fn is_unavailable(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::UnexpectedStatus { status, .. } => *status >= 500,
            BackendError::InvalidRequest(_) => false,
        }
    }
}

/// Raw backend endpoints
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Check limits without recording usage
    async fn authorize(&self, request: &AuthRepRequest) -> Result<AuthRepResponse, BackendError>;

    /// Check limits and record usage in one call
    async fn authrep(&self, request: &AuthRepRequest) -> Result<AuthRepResponse, BackendError>;

    /// Record accumulated usage
    async fn report(&self, batch: &ReportBatch) -> Result<(), BackendError>;
}

/// Client the manager dispatches authorization through
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authorize_and_report(
        &self,
        request: AuthRepRequest,
    ) -> Result<AuthRepResponse, BackendError>;

    /// Push any buffered usage upstream. Direct clients buffer nothing.
    async fn flush(&self) -> FlushSummary {
        FlushSummary::default()
    }
}
