//! Delivery client.
//!
//! One network call per envelope kind present in a batch. Success is exactly
//! HTTP 200. Any other status, transport error, or timeout is logged and the
//! items are dropped: there is no retry, no backoff and no dead-letter queue.

use crate::config::RelayConfig;
use crate::encode::encode_body;
use crate::envelope::Envelope;
use crate::error::DeliveryError;
use crate::metrics::RelayMetrics;
use crate::payload::{partition, EvaluationEntry, EvaluationRunsBatchPayload, SpansBatchPayload};
use crate::transport::{TransportBoxed, TransportRequest};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest response body kept in a warning.
const MAX_LOGGED_BODY: usize = 512;

/// Sends partitioned batches to their endpoints.
pub struct DeliveryClient {
    transport: Arc<dyn TransportBoxed>,
    spans_url: String,
    evaluation_runs_url: String,
    organization_id: String,
    metrics: Arc<RelayMetrics>,
}

impl DeliveryClient {
    pub fn new(
        config: &RelayConfig,
        transport: Arc<dyn TransportBoxed>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            transport,
            spans_url: config.spans_url(),
            evaluation_runs_url: config.evaluation_runs_url(),
            organization_id: config.organization_id.clone(),
            metrics,
        }
    }

    /// Partitions a drained batch and delivers each kind present.
    pub async fn deliver_batch(&self, batch: Vec<Envelope>) {
        if batch.is_empty() {
            return;
        }
        let parts = partition(batch);

        if !parts.spans.is_empty() {
            self.deliver_spans(&parts.spans).await;
        }
        if !parts.evaluation_entries.is_empty() {
            self.deliver_evaluation_runs(&parts.evaluation_entries).await;
        }
    }

    /// Sends span records. Returns `true` if the service acknowledged them.
    pub async fn deliver_spans(&self, spans: &[Map<String, Value>]) -> bool {
        let payload = SpansBatchPayload {
            spans,
            organization_id: &self.organization_id,
        };
        let count = spans.len() as u64;

        match self.post(&self.spans_url, &payload).await {
            Ok(()) => {
                self.metrics.record_spans_delivered(count);
                debug!(count, "Delivered spans batch");
                true
            }
            Err(e) => {
                self.metrics.record_failure(count);
                warn!(
                    count,
                    transport = self.transport.name(),
                    error = %e,
                    "Failed to send spans batch"
                );
                false
            }
        }
    }

    /// Sends evaluation entries. Returns `true` if the service acknowledged them.
    pub async fn deliver_evaluation_runs(&self, entries: &[EvaluationEntry]) -> bool {
        let payload = EvaluationRunsBatchPayload {
            organization_id: &self.organization_id,
            evaluation_entries: entries,
        };
        let count = entries.len() as u64;

        match self.post(&self.evaluation_runs_url, &payload).await {
            Ok(()) => {
                self.metrics.record_evaluation_runs_delivered(count);
                debug!(count, "Delivered evaluation runs batch");
                true
            }
            Err(e) => {
                self.metrics.record_failure(count);
                warn!(
                    count,
                    transport = self.transport.name(),
                    error = %e,
                    "Failed to send evaluation runs batch"
                );
                false
            }
        }
    }

    async fn post<T: Serialize>(&self, url: &str, payload: &T) -> Result<(), DeliveryError> {
        let body = encode_body(payload)?;
        let response = self
            .transport
            .send_boxed(TransportRequest {
                url: url.to_string(),
                body,
            })
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: response.status,
                body: truncate(response.body),
            })
        }
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_LOGGED_BODY {
        let mut end = MAX_LOGGED_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}
