#![allow(dead_code)]

use serde_json::Value;
use span_relay::{DeliveryError, RelayConfig, Transport, TransportRequest, TransportResponse};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub const SPANS_URL: &str = "http://collector.test/traces/spans/batch/";
pub const EVALUATION_RUNS_URL: &str = "http://collector.test/traces/evaluation_runs/batch/";

/// Records every request; answers with scripted statuses, then 200.
pub struct RecordingTransport {
    requests: Mutex<Vec<TransportRequest>>,
    statuses: Mutex<VecDeque<u16>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_statuses(statuses: &[u16]) -> Self {
        let transport = Self::new();
        transport.statuses.lock().unwrap().extend(statuses);
        transport
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bodies_for(&self, url: &str) -> Vec<Value> {
        self.requests()
            .iter()
            .filter(|r| r.url == url)
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    /// Number of spans in each span request, in delivery order.
    pub fn span_batch_sizes(&self) -> Vec<usize> {
        self.bodies_for(SPANS_URL)
            .iter()
            .map(|b| b["spans"].as_array().unwrap().len())
            .collect()
    }

    pub fn delivered_span_ids(&self) -> Vec<String> {
        self.bodies_for(SPANS_URL)
            .iter()
            .flat_map(|b| b["spans"].as_array().unwrap().clone())
            .map(|s| s["span_id"].as_str().unwrap().to_string())
            .collect()
    }
}

impl Transport for RecordingTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, DeliveryError> {
        self.requests.lock().unwrap().push(request);
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        Ok(TransportResponse {
            status,
            body: if status == 200 { String::new() } else { "internal error".to_string() },
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn test_config() -> RelayConfig {
    RelayConfig::new("test-key", "org-test")
        .with_api_url("http://collector.test")
        .with_idle_timeout(Duration::from_millis(20))
}
