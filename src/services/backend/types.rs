//! Wire-level backend (Service Management API) request and response types

use std::collections::HashMap;

/// Extension asking the backend to explain rejections in a response header
pub const REJECTION_REASON_HEADER_EXTENSION: &str = "rejection_reason_header";

/// Header the backend uses for the rejection reason code
pub const REJECTION_REASON_HEADER: &str = "3scale-rejection-reason";

/// Header carrying `name=value` extension flags on every call
pub const EXTENSIONS_HEADER: &str = "3scale-options";

/// Credential type sent as `service_token=...`
pub const SERVICE_TOKEN: &str = "service_token";

/// Credential type sent as `provider_key=...`
pub const PROVIDER_KEY: &str = "provider_key";

/// Metric name to delta
pub type Metrics = HashMap<String, i64>;

/// Service-level credential. `auth_type` doubles as the query parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientAuth {
    pub auth_type: String,
    pub value: String,
}

/// Application credentials identifying the caller of the managed API
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Params {
    pub app_id: String,
    pub app_key: String,
    pub user_id: String,
    pub user_key: String,
}

impl Params {
    /// Non-empty credential pairs in the order the backend documents them
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("app_id", self.app_id.as_str()),
            ("app_key", self.app_key.as_str()),
            ("user_id", self.user_id.as_str()),
            ("user_key", self.user_key.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub metrics: Metrics,
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthRepRequest {
    pub auth: ClientAuth,
    pub service: String,
    pub transactions: Vec<Transaction>,
    pub extensions: HashMap<String, String>,
}

impl AuthRepRequest {
    /// Render extensions as the `3scale-options` header value, sorted for stable output
    pub fn extensions_header(&self) -> Option<String> {
        if self.extensions.is_empty() {
            return None;
        }
        let mut pairs: Vec<_> = self
            .extensions
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        pairs.sort();
        Some(pairs.join("&"))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthRepResponse {
    pub authorized: bool,
    pub error_code: Option<String>,
    pub rejection_reason: Option<String>,
    pub raw_response: Option<String>,
}

/// Usage for one (service, credentials) pair, accumulated between flushes
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBatch {
    pub auth: ClientAuth,
    pub service: String,
    pub params: Params,
    pub usage: Metrics,
}

/// Outcome of draining a report buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub reported: usize,
    pub requeued: usize,
}
