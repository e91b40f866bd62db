use thiserror::Error;

use crate::manager::BackendResponse;
use crate::services::backend::BackendError;
use crate::services::system::SystemError;

/// Which step of a configuration fetch produced a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Direct fetch, no cache configured
    Remote,
    /// Fetch triggered by a cache miss on the request path
    CacheFill,
    /// Background refresh of a stored entry
    Refresh,
}

impl FetchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPhase::Remote => "remote_fetch",
            FetchPhase::CacheFill => "cache_fill",
            FetchPhase::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AuthorizerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cannot process empty transaction")]
    EmptyTransaction,

    #[error("Cannot get system config ({phase}): {source}")]
    RemoteFetch {
        phase: FetchPhase,
        #[source]
        source: SystemError,
    },

    /// Carries the best-effort response (never authorized) alongside the cause
    #[error("Error calling AuthRep: {source}")]
    BackendCall {
        #[source]
        source: BackendError,
        response: Box<BackendResponse>,
    },

    #[error("Unable to create cached backend for {destination}: {reason}")]
    BackendCreation { destination: String, reason: String },

    #[error("Unable to build client for {target}: {reason}")]
    ClientBuild { target: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthorizerError {
    /// Stable label naming the phase that failed, used in logs and metrics
    pub fn phase(&self) -> &'static str {
        match self {
            AuthorizerError::InvalidRequest(_) => "validation",
            AuthorizerError::EmptyTransaction => "translation",
            AuthorizerError::RemoteFetch { phase, .. } => phase.as_str(),
            AuthorizerError::BackendCall { .. } => "backend_call",
            AuthorizerError::BackendCreation { .. } => "backend_creation",
            AuthorizerError::ClientBuild { .. } => "client_build",
            AuthorizerError::Config(_) => "config",
        }
    }

    /// Partial response preserved from a failed backend call
    pub fn backend_response(&self) -> Option<&BackendResponse> {
        match self {
            AuthorizerError::BackendCall { response, .. } => Some(response),
            _ => None,
        }
    }
}
