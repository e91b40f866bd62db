//! One buffered backend per destination, each with its own flush loop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::error::AuthorizerError;
use crate::services::ClientBuilder;
use crate::services::backend::{AuthBackend, FailurePolicy};

type BackendCell = Arc<OnceCell<Arc<dyn AuthBackend>>>;

/// Registry of cached backends keyed by destination URL.
///
/// Each destination is built at most once even under concurrent first use;
/// a failed build leaves the slot empty so a later call may retry. Once
/// [`BackendCacheRegistry::shutdown`] has started no new backend is created.
pub struct BackendCacheRegistry {
    builder: Arc<dyn ClientBuilder>,
    policy: Arc<dyn FailurePolicy>,
    flush_interval: Duration,
    entries: RwLock<HashMap<String, BackendCell>>,
    /// `None` once shutdown has taken the handles
    flush_loops: Mutex<Option<Vec<JoinHandle<()>>>>,
    stop_flushing: watch::Sender<bool>,
}

impl BackendCacheRegistry {
    pub fn new(
        builder: Arc<dyn ClientBuilder>,
        policy: Arc<dyn FailurePolicy>,
        flush_interval: Duration,
    ) -> Self {
        let (stop_flushing, _) = watch::channel(false);
        Self {
            builder,
            policy,
            flush_interval,
            entries: RwLock::new(HashMap::new()),
            flush_loops: Mutex::new(Some(Vec::new())),
            stop_flushing,
        }
    }

    /// Cached backend for `destination`, creating it and its flush loop on first use.
    ///
    /// Fails for every destination once shutdown has started, including ones
    /// already created: their flush loops are gone.
    pub async fn get_or_create(
        &self,
        destination: &str,
    ) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        if self.is_shut_down().await {
            return Err(shutting_down(destination));
        }
        let cell = self.cell_for(destination).await;
        let backend = cell.get_or_try_init(|| self.create(destination)).await?;
        Ok(backend.clone())
    }

    /// Number of destinations with a live backend
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether [`BackendCacheRegistry::shutdown`] has taken the flush loops
    pub async fn is_shut_down(&self) -> bool {
        self.flush_loops.lock().await.is_none()
    }

    async fn cell_for(&self, destination: &str) -> BackendCell {
        if let Some(cell) = self.entries.read().await.get(destination) {
            return cell.clone();
        }
        self.entries
            .write()
            .await
            .entry(destination.to_string())
            .or_default()
            .clone()
    }

    async fn create(&self, destination: &str) -> Result<Arc<dyn AuthBackend>, AuthorizerError> {
        let backend = self
            .builder
            .build_cached_backend(destination, self.policy.clone())
            .map_err(|e| match e {
                AuthorizerError::BackendCreation { .. } => e,
                other => AuthorizerError::BackendCreation {
                    destination: destination.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let mut flush_loops = self.flush_loops.lock().await;
        let Some(handles) = flush_loops.as_mut() else {
            return Err(shutting_down(destination));
        };

        handles.push(tokio::spawn(flush_loop(
            destination.to_string(),
            backend.clone(),
            self.flush_interval,
            self.stop_flushing.subscribe(),
        )));

        info!(
            destination = %destination,
            policy = %self.policy.name(),
            flush_interval_secs = self.flush_interval.as_secs(),
            "Created cached backend"
        );
        Ok(backend)
    }

    /// Stop every flush loop and wait for each to finish its final drain.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        let Some(handles) = self.flush_loops.lock().await.take() else {
            return;
        };
        self.stop_flushing.send_replace(true);

        debug!(loops = handles.len(), "Waiting for flush loops to drain");
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Flush loop terminated abnormally");
            }
        }
    }
}

fn shutting_down(destination: &str) -> AuthorizerError {
    AuthorizerError::BackendCreation {
        destination: destination.to_string(),
        reason: "manager is shutting down".to_string(),
    }
}

async fn flush_loop(
    destination: String,
    backend: Arc<dyn AuthBackend>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = backend.flush().await;
                debug!(
                    destination = %destination,
                    reported = summary.reported,
                    requeued = summary.requeued,
                    "Periodic flush"
                );
            }
            _ = wait_for_stop(&mut stop) => {
                let summary = backend.flush().await;
                info!(
                    destination = %destination,
                    reported = summary.reported,
                    requeued = summary.requeued,
                    "Final flush before shutdown"
                );
                break;
            }
        }
    }
}

/// Resolves once the stop flag is set or its sender is gone
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
