//! Failover request dispatch over a pool of redundant service endpoints.
//!
//! A logical request is tried against every endpoint of a pool in a fresh random order. Each
//! endpoint gets its own retry window; the first transport-level response wins regardless of
//! its HTTP status. Only when every endpoint has used up its window does the call fail.

pub mod mock;
pub mod request;
pub mod transport;


pub use mock::{MockReply, MockTransport, RecordedRequest};
pub use request::{Credentials, RequestBody, RequestSpec};
pub use transport::{build_http_client, HttpTransport, OutboundRequest, Transport, TransportError};

use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::config::WorkerConfig;
use crate::error::{ErrorCode, Result, WorkerError};

/// Pause between two attempts against the same endpoint
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Stand-in deadline for windows too large to add to the current instant
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Immutable set of base addresses serving one service role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool {
    role: String,
    hosts: Vec<String>,
}

impl EndpointPool {
    pub fn new(role: impl Into<String>, hosts: Vec<String>) -> Result<Self> {
        let role = role.into();
        if hosts.is_empty() {
            return Err(WorkerError::service_with_code(
                ErrorCode::SERVICE_NO_ENDPOINTS,
                format!("There is no {} to talk with", role),
                Some(role),
            ));
        }
        Ok(Self { role, hosts })
    }

    /// Pool with exactly one endpoint, used for the information service
    pub fn single(role: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            hosts: vec![host.into()],
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// A uniformly random permutation of the hosts
    pub fn shuffled(&self) -> Vec<String> {
        let mut hosts = self.hosts.clone();
        hosts.shuffle(&mut rand::rng());
        hosts
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    scheme: String,
    credentials: Credentials,
    retry_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        scheme: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            transport,
            scheme: scheme.into(),
            credentials,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Production dispatcher speaking HTTP(S) according to the configuration
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(
            Arc::new(transport),
            config.scheme(),
            Credentials::new(
                config.experiment_manager_user.clone(),
                config.experiment_manager_pass.clone(),
            ),
        ))
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Execute `request` against `pool`, failing over until one endpoint answers.
    ///
    /// `timeout` is the retry window granted to each endpoint.
    pub async fn dispatch(
        &self,
        request: &RequestSpec,
        pool: &EndpointPool,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let order = pool.shuffled();

        for endpoint in &order {
            let url = self.endpoint_url(endpoint, &request.path)?;
            tracing::info!("{} {}", request.method, url);

            let outbound = OutboundRequest {
                method: request.method.clone(),
                endpoint,
                path: &request.path,
                url,
                body: &request.body,
                credentials: &self.credentials,
            };

            match self.get_with_timeout(&outbound, timeout).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    tracing::warn!(
                        "{} {} failed for {}: {}",
                        pool.role(),
                        endpoint,
                        request.path,
                        e
                    );
                }
            }
        }

        Err(WorkerError::transport_exhausted(
            format!(
                "Could not {} {} on any {}",
                request.method,
                request.path,
                pool.role()
            ),
            order,
        ))
    }

    /// Retry one endpoint until it answers or `window` has elapsed
    async fn get_with_timeout(
        &self,
        request: &OutboundRequest<'_>,
        window: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let now = Instant::now();
        let deadline = now.checked_add(window).unwrap_or(now + FAR_FUTURE);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let error = match tokio::time::timeout(remaining, self.transport.send(request)).await {
                Ok(Ok(body)) => return Ok(body),
                Ok(Err(e)) => e,
                Err(_) => TransportError::Timeout(window),
            };

            tracing::debug!("Attempt against {} failed: {}", request.endpoint, error);
            tokio::time::sleep(self.retry_backoff).await;

            if Instant::now() >= deadline {
                return Err(error);
            }
        }
    }

    fn endpoint_url(&self, endpoint: &str, path: &str) -> Result<Url> {
        let raw = format!("{}://{}/{}", self.scheme, endpoint, path);
        Url::parse(&raw).map_err(|e| {
            WorkerError::transport_with_code(
                ErrorCode::TRANSPORT_INVALID_URL,
                format!("Invalid service address '{}'", raw),
            )
            .with_source(e)
        })
    }
}
