//! What a buffered backend answers when the backend cannot be reached
//!
//! - **Fail closed** (default): the error reaches the caller and the request
//!   is not authorized.
//! - **Fail open**: transport failures and 5xx responses authorize the
//!   request and its usage is buffered for the next flush. Explicit denials
//!   are never overridden since they are answers, not outages.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::{AuthRepRequest, BackendError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicyKind {
    Open,
    #[default]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny,
}

pub trait FailurePolicy: Send + Sync {
    fn on_unavailable(&self, request: &AuthRepRequest, error: &BackendError) -> PolicyDecision;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FailClosed;

impl FailurePolicy for FailClosed {
    fn on_unavailable(&self, _request: &AuthRepRequest, _error: &BackendError) -> PolicyDecision {
        PolicyDecision::Deny
    }

    fn name(&self) -> &'static str {
        "closed"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FailOpen;

impl FailurePolicy for FailOpen {
    fn on_unavailable(&self, request: &AuthRepRequest, error: &BackendError) -> PolicyDecision {
        if !error.is_unavailable() {
            return PolicyDecision::Deny;
        }
        warn!(
            service = %request.service,
            error = %error,
            "Backend unavailable, failing open"
        );
        PolicyDecision::Allow
    }

    fn name(&self) -> &'static str {
        "open"
    }
}

pub fn policy_for(kind: FailurePolicyKind) -> Arc<dyn FailurePolicy> {
    match kind {
        FailurePolicyKind::Open => Arc::new(FailOpen),
        FailurePolicyKind::Closed => Arc::new(FailClosed),
    }
}
