//! Buffered backend: authorize per request, report usage in batches
//!
//! Authorized usage is accumulated per (credential, service, application)
//! key. A flush drains the buffer and reports each batch; batches that fail
//! to report are merged back so the next flush retries them with whatever
//! usage arrived in between.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::policy::{FailurePolicy, PolicyDecision};
use super::{
    AuthBackend, AuthRepRequest, AuthRepResponse, BackendError, BackendTransport, ClientAuth,
    FlushSummary, Metrics, Params, ReportBatch,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    auth: ClientAuth,
    service: String,
    params: Params,
}

/// Pending usage keyed by credentials
#[derive(Debug, Default)]
pub struct ReportBuffer {
    pending: HashMap<BatchKey, Metrics>,
}

impl ReportBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every transaction of an authorized request
    pub fn record(&mut self, request: &AuthRepRequest) {
        for transaction in &request.transactions {
            let key = BatchKey {
                auth: request.auth.clone(),
                service: request.service.clone(),
                params: transaction.params.clone(),
            };
            Self::accumulate(self.pending.entry(key).or_default(), &transaction.metrics);
        }
    }

    /// Put a batch that failed to report back into the buffer
    pub fn merge(&mut self, batch: ReportBatch) {
        let key = BatchKey {
            auth: batch.auth,
            service: batch.service,
            params: batch.params,
        };
        Self::accumulate(self.pending.entry(key).or_default(), &batch.usage);
    }

    pub fn drain(&mut self) -> Vec<ReportBatch> {
        self.pending
            .drain()
            .filter(|(_, usage)| !usage.is_empty())
            .map(|(key, usage)| ReportBatch {
                auth: key.auth,
                service: key.service,
                params: key.params,
                usage,
            })
            .collect()
    }

    /// Number of distinct credential keys waiting to be reported
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sums saturate at the `i64` bounds
    fn accumulate(into: &mut Metrics, usage: &Metrics) {
        for (metric, delta) in usage {
            let total = into.entry(metric.clone()).or_insert(0);
            match total.checked_add(*delta) {
                Some(sum) => *total = sum,
                None => {
                    warn!(metric = %metric, delta = *delta, "Buffered usage overflowed, saturating");
                    *total = total.saturating_add(*delta);
                }
            }
        }
    }
}

pub struct BufferedBackend {
    destination: String,
    transport: Arc<dyn BackendTransport>,
    policy: Arc<dyn FailurePolicy>,
    buffer: Mutex<ReportBuffer>,
}

impl BufferedBackend {
    pub fn new(
        destination: impl Into<String>,
        transport: Arc<dyn BackendTransport>,
        policy: Arc<dyn FailurePolicy>,
    ) -> Self {
        Self {
            destination: destination.into(),
            transport,
            policy,
            buffer: Mutex::new(ReportBuffer::new()),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[async_trait]
impl AuthBackend for BufferedBackend {
    async fn authorize_and_report(
        &self,
        request: AuthRepRequest,
    ) -> Result<AuthRepResponse, BackendError> {
        match self.transport.authorize(&request).await {
            Ok(response) => {
                if response.authorized {
                    self.buffer.lock().await.record(&request);
                }
                Ok(response)
            }
            Err(error) => match self.policy.on_unavailable(&request, &error) {
                PolicyDecision::Allow => {
                    self.buffer.lock().await.record(&request);
                    Ok(AuthRepResponse {
                        authorized: true,
                        raw_response: error.raw_response().map(str::to_string),
                        ..Default::default()
                    })
                }
                PolicyDecision::Deny => Err(error),
            },
        }
    }

    async fn flush(&self) -> FlushSummary {
        let batches = self.buffer.lock().await.drain();
        let mut summary = FlushSummary::default();
        if batches.is_empty() {
            return summary;
        }

        for batch in batches {
            match self.transport.report(&batch).await {
                Ok(()) => summary.reported += 1,
                Err(error) => {
                    warn!(
                        destination = %self.destination,
                        service = %batch.service,
                        error = %error,
                        "Usage report failed, keeping usage for next flush"
                    );
                    self.buffer.lock().await.merge(batch);
                    summary.requeued += 1;
                }
            }
        }

        debug!(
            destination = %self.destination,
            reported = summary.reported,
            requeued = summary.requeued,
            "Flushed buffered usage"
        );
        summary
    }
}
