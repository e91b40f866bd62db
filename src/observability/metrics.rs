//! Metrics reporting for the authorizer
//!
//! Collaborators receive an `Arc<dyn MetricsReporter>` and never talk to a
//! recorder directly. When no reporter is supplied the [`NoopReporter`] is
//! used, so reporting never needs a presence check on the hot path.
//!
//! # Cardinality Control
//!
//! - Status codes bucketed (2xx, 3xx, 4xx, 5xx)
//! - Endpoint labels are static strings chosen by the clients
//! - Credentials and service ids are never used as labels

use std::time::Duration;

use metrics::{counter, histogram};

/// Which cache produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheName {
    System,
}

impl CacheName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheName::System => "system",
        }
    }
}

/// Remote party a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    System,
    Backend,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::System => "system",
            Target::Backend => "backend",
        }
    }
}

/// A single remote response, reported after the status line is received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseObservation<'a> {
    pub target: Target,
    pub endpoint: &'a str,
    pub status: u16,
    pub duration: Duration,
}

pub trait MetricsReporter: Send + Sync {
    fn cache_hit(&self, cache: CacheName);

    fn observe_response(&self, observation: &ResponseObservation<'_>);

    /// Cached backend creation failed and the call degraded to a direct client
    fn backend_creation_failed(&self, _destination: &str) {}
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl MetricsReporter for NoopReporter {
    fn cache_hit(&self, _cache: CacheName) {}

    fn observe_response(&self, _observation: &ResponseObservation<'_>) {}
}

/// Reporter backed by the global `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusReporter;

impl MetricsReporter for PrometheusReporter {
    fn cache_hit(&self, cache: CacheName) {
        counter!("authorizer_cache_hits_total", "cache" => cache.as_str()).increment(1);
    }

    fn observe_response(&self, observation: &ResponseObservation<'_>) {
        let target = observation.target.as_str();
        let endpoint = observation.endpoint.to_string();
        let status = bucket_status_code(observation.status);

        counter!(
            "authorizer_remote_responses_total",
            "target" => target,
            "endpoint" => endpoint.clone(),
            "status" => status
        )
        .increment(1);

        histogram!(
            "authorizer_remote_response_duration_seconds",
            "target" => target,
            "endpoint" => endpoint
        )
        .record(observation.duration.as_secs_f64());
    }

    fn backend_creation_failed(&self, destination: &str) {
        counter!(
            "authorizer_backend_creation_failures_total",
            "destination" => destination.to_string()
        )
        .increment(1);
    }
}

/// Bucket status codes to reduce cardinality
pub fn bucket_status_code(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_status_code_bucketing() {
        assert_eq!(bucket_status_code(200), "2xx");
        assert_eq!(bucket_status_code(202), "2xx");
        assert_eq!(bucket_status_code(302), "3xx");
        assert_eq!(bucket_status_code(409), "4xx");
        assert_eq!(bucket_status_code(503), "5xx");
        assert_eq!(bucket_status_code(0), "other");
    }

    #[test]
    fn test_prometheus_reporter_records_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let reporter = PrometheusReporter;
            reporter.cache_hit(CacheName::System);
            reporter.cache_hit(CacheName::System);
            reporter.observe_response(&ResponseObservation {
                target: Target::Backend,
                endpoint: "authrep",
                status: 409,
                duration: Duration::from_millis(12),
            });
            reporter.backend_creation_failed("https://backend.example.com");
        });

        let rendered = handle.render();
        assert!(rendered.contains("authorizer_cache_hits_total{cache=\"system\"} 2"));
        assert!(rendered.contains("authorizer_remote_responses_total"));
        assert!(rendered.contains("status=\"4xx\""));
        assert!(rendered.contains("authorizer_backend_creation_failures_total"));
    }

    #[test]
    fn test_noop_reporter_accepts_everything() {
        let reporter: &dyn MetricsReporter = &NoopReporter;
        reporter.cache_hit(CacheName::System);
        reporter.observe_response(&ResponseObservation {
            target: Target::System,
            endpoint: "proxy_config_latest",
            status: 200,
            duration: Duration::ZERO,
        });
        reporter.backend_creation_failed("anywhere");
    }
}
