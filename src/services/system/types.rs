//! Control-plane proxy configuration documents
//!
//! Only the fields the gateway acts on are modelled; unknown fields are
//! ignored and missing ones fall back to their defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope returned by the `latest.json` endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfigElement {
    pub proxy_config: ProxyConfig,
}

/// One promoted version of a service's gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub id: i64,
    pub version: i64,
    pub environment: String,
    pub content: Content,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Content {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub system_name: String,
    pub state: String,
    pub backend_version: String,
    pub backend_authentication_type: String,
    pub backend_authentication_value: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub proxy: ContentProxy,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ContentProxy {
    pub id: i64,
    pub service_id: i64,
    pub endpoint: String,
    pub sandbox_endpoint: String,
    pub api_backend: String,
    pub auth_app_id: String,
    pub auth_app_key: String,
    pub auth_user_key: String,
    pub credentials_location: String,
    pub authentication_method: String,
    pub error_auth_failed: String,
    pub error_status_auth_failed: i64,
    pub error_auth_missing: String,
    pub error_status_auth_missing: i64,
    pub error_no_match: String,
    pub error_status_no_match: i64,
    pub hostname_rewrite: Option<String>,
    pub lock_version: i64,
    pub hosts: Vec<String>,
    pub backend: Backend,
    pub policy_chain: Vec<PolicyChain>,
    pub proxy_rules: Vec<ProxyRule>,
}

/// Where usage for this service is authorized and reported
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Backend {
    pub endpoint: String,
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyChain {
    pub name: String,
    pub version: String,
    pub configuration: serde_json::Value,
}

/// Mapping rule: requests matching `http_method` + `pattern` count `delta`
/// against `metric_system_name`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyRule {
    pub id: i64,
    pub http_method: String,
    pub pattern: String,
    pub metric_id: i64,
    pub metric_system_name: String,
    pub delta: i64,
    pub parameters: Vec<String>,
}

impl ProxyConfig {
    /// Backend endpoint the configuration points usage at, if any
    pub fn backend_endpoint(&self) -> Option<&str> {
        let endpoint = self.content.proxy.backend.endpoint.as_str();
        (!endpoint.is_empty()).then_some(endpoint)
    }
}
