use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Refresh;
use crate::error::{AuthorizerError, FetchPhase};
use crate::services::ClientBuilder;
use crate::services::system::{ProxyConfig, RetryPolicy};

use super::SystemRequest;

/// Fetch the latest configuration through a freshly built system client
pub(crate) async fn fetch_remotely(
    builder: &dyn ClientBuilder,
    location: &str,
    request: &SystemRequest,
    phase: FetchPhase,
) -> Result<ProxyConfig, AuthorizerError> {
    let client = builder.build_system_client(location, &request.access_token)?;
    client
        .fetch_latest(&request.service_id, &request.environment)
        .await
        .map_err(|source| AuthorizerError::RemoteFetch { phase, source })
}

/// Re-fetches one cached configuration with the original request's credentials
pub(crate) struct ConfigRefresher {
    builder: Arc<dyn ClientBuilder>,
    location: String,
    request: SystemRequest,
    retry: RetryPolicy,
}

impl ConfigRefresher {
    pub(crate) fn new(
        builder: Arc<dyn ClientBuilder>,
        location: &str,
        request: SystemRequest,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            builder,
            location: location.to_string(),
            request,
            retry,
        }
    }
}

#[async_trait]
impl Refresh for ConfigRefresher {
    async fn refresh(&self) -> Result<ProxyConfig, AuthorizerError> {
        let builder = self.builder.as_ref();
        let location = self.location.as_str();
        let request = &self.request;

        self.retry
            .execute(move || fetch_remotely(builder, location, request, FetchPhase::Refresh))
            .await
    }
}
