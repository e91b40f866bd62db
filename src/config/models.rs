use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::cache::ConfigCacheConfig;
use crate::manager::BackendConfig;
use crate::services::backend::policy::{policy_for, FailurePolicyKind};

#[derive(Debug, Deserialize, Serialize, Validate, Default)]
pub struct AuthorizerConfig {
    #[garde(dive)]
    #[serde(default)]
    pub system_cache: SystemCacheSettings,

    #[garde(dive)]
    #[serde(default)]
    pub backend: BackendSettings,

    #[garde(dive)]
    #[serde(default)]
    pub http: HttpSettings,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Control-plane configuration cache. Zero for a duration or size selects the default.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SystemCacheSettings {
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[garde(range(max = 100_000))]
    #[serde(default)]
    pub max_size: usize,

    #[garde(range(max = 10))]
    #[serde(default = "default_num_retry_failed_refresh")]
    pub num_retry_failed_refresh: u32,

    #[garde(range(max = 86_400))]
    #[serde(default)]
    pub refresh_interval_seconds: u64,

    #[garde(range(max = 86_400))]
    #[serde(default)]
    pub ttl_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_num_retry_failed_refresh() -> u32 {
    1
}

impl Default for SystemCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 0,
            num_retry_failed_refresh: 1,
            refresh_interval_seconds: 0,
            ttl_seconds: 0,
        }
    }
}

impl SystemCacheSettings {
    pub fn to_cache_config(&self) -> ConfigCacheConfig {
        ConfigCacheConfig {
            max_size: self.max_size,
            num_retry_failed_refresh: self.num_retry_failed_refresh,
            refresh_interval: Duration::from_secs(self.refresh_interval_seconds),
            ttl: Duration::from_secs(self.ttl_seconds),
        }
        .with_defaults()
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BackendSettings {
    #[garde(skip)]
    #[serde(default)]
    pub enable_caching: bool,

    /// Seconds between buffered usage flushes; zero selects the default
    #[garde(range(max = 3_600))]
    #[serde(default)]
    pub cache_flush_interval_seconds: u64,

    #[garde(skip)]
    #[serde(default)]
    pub failure_policy: FailurePolicyKind,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enable_caching: false,
            cache_flush_interval_seconds: 0,
            failure_policy: FailurePolicyKind::Closed,
        }
    }
}

impl BackendSettings {
    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig {
            enable_caching: self.enable_caching,
            cache_flush_interval: Duration::from_secs(self.cache_flush_interval_seconds),
            failure_policy: policy_for(self.failure_policy),
        }
        .with_defaults()
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct HttpSettings {
    #[garde(range(min = 1, max = 120_000))]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[garde(range(min = 1, max = 60_000))]
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    1_000
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String, // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct MetricsSettings {
    #[garde(skip)]
    #[serde(default)]
    pub enabled: bool,

    #[garde(range(min = 1024, max = 65535))]
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}
