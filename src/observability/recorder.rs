//! Prometheus recorder installation
//!
//! The exporter serves `/metrics` on its own listener; the authorizer has no
//! HTTP surface of its own to mount it on.

use std::net::SocketAddr;

use anyhow::{Result, anyhow};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsSettings;

/// Install the global Prometheus recorder when metrics are enabled.
///
/// Must run inside a Tokio runtime, the exporter spawns its listener there.
/// Returns the listen address, or `None` when metrics are disabled.
pub fn init_metrics(settings: &MetricsSettings) -> Result<Option<SocketAddr>> {
    if !settings.enabled {
        tracing::debug!("Metrics disabled, skipping recorder installation");
        return Ok(None);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", env!("CARGO_PKG_NAME"))
        .add_global_label("version", env!("CARGO_PKG_VERSION"))
        .install()
        .map_err(|e| anyhow!("Failed to install Prometheus recorder: {}", e))?;

    tracing::info!(port = %settings.port, "Prometheus metrics exporter started");

    Ok(Some(addr))
}
