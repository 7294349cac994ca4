use crate::config::RelayConfig;
use crate::error::{ConfigError, DeliveryError, RelayError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Header carrying the organization id.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// A serialized batch addressed to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub body: Vec<u8>,
}

impl TransportRequest {
    /// Parses the body back into JSON (for inspection and tests).
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Status and body returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: String::new(),
        }
    }

    /// Only 200 counts as delivered.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Trait for sending serialized batches to the collection service.
///
/// Uses `impl Future` return types, which are not object-safe.
/// For dynamic dispatch, use `Arc<dyn TransportBoxed>`.
pub trait Transport: Send + Sync {
    /// Sends one request. A non-200 status is a response, not an error.
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, DeliveryError>> + Send;

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

/// Object-safe version of [`Transport`] for dynamic dispatch.
pub trait TransportBoxed: Send + Sync {
    fn send_boxed(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, DeliveryError>> + Send + '_>>;

    fn name(&self) -> &str;
}

/// Blanket implementation: any Transport can be used as TransportBoxed
impl<T: Transport> TransportBoxed for T {
    fn send_boxed(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, DeliveryError>> + Send + '_>> {
        Box::pin(self.send(request))
    }

    fn name(&self) -> &str {
        Transport::name(self)
    }
}

/// HTTPS transport with bearer auth and the organization header.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ConfigError::InvalidHeader("api_key"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let org = HeaderValue::from_str(&config.organization_id)
            .map_err(|_| ConfigError::InvalidHeader("organization_id"))?;
        headers.insert(HeaderName::from_static(ORGANIZATION_HEADER), org);

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, DeliveryError> {
        let response = self
            .client
            .post(&request.url)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(status, url = %request.url, error = %e, "Failed to read response body");
                String::new()
            }
        };
        Ok(TransportResponse { status, body })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Test transport that records every request and answers with scripted results
#[cfg(test)]
pub(crate) struct RecordingTransport {
    requests: std::sync::Mutex<Vec<TransportRequest>>,
    script: std::sync::Mutex<std::collections::VecDeque<Result<u16, DeliveryError>>>,
    delay: std::time::Duration,
}

#[cfg(test)]
impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            requests: std::sync::Mutex::new(Vec::new()),
            script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            delay: std::time::Duration::ZERO,
        }
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues the outcome of the next unscripted call; calls past the script get 200.
    pub(crate) fn then(self, outcome: Result<u16, DeliveryError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.requests.lock().unwrap().push(request);
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(200));
        outcome.map(|status| TransportResponse {
            status,
            body: if status == 200 { String::new() } else { "server error".to_string() },
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}
