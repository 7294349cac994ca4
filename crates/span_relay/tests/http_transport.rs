//! HTTP transport against a local collection server.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use span_relay::{
    DeliveryError, EvaluationRun, HttpTransport, RelayConfig, RelayService, SpanState, TraceSpan,
    Transport, TransportRequest,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Received {
    path: String,
    authorization: Option<String>,
    organization: Option<String>,
    content_type: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct ServerState {
    received: Arc<Mutex<Vec<Received>>>,
    status: Arc<AtomicU16>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(200)),
        }
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn collect(
    State(state): State<ServerState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.received.lock().unwrap().push(Received {
        path: uri.path().to_string(),
        authorization: header(&headers, "authorization"),
        organization: header(&headers, "x-organization-id"),
        content_type: header(&headers, "content-type"),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let status = StatusCode::from_u16(state.status.load(Ordering::Relaxed))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = if status == StatusCode::OK { "ok" } else { "rejected" };
    (status, body)
}

async fn slow() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}

async fn serve(state: ServerState) -> SocketAddr {
    let app = Router::new()
        .route("/traces/spans/batch/", post(collect))
        .route("/traces/evaluation_runs/batch/", post(collect))
        .route("/slow", post(slow))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> RelayConfig {
    RelayConfig::new("key-123", "org-9").with_api_url(format!("http://{addr}"))
}

fn request(url: String, body: Value) -> TransportRequest {
    TransportRequest {
        url,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

#[tokio::test]
async fn test_sends_auth_headers_and_body() {
    let state = ServerState::new();
    let addr = serve(state.clone()).await;
    let config = config(addr);
    let transport = HttpTransport::new(&config).unwrap();

    let response = transport
        .send(request(config.spans_url(), json!({"spans": [], "organization_id": "org-9"})))
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.body, "ok");

    let received = state.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, "/traces/spans/batch/");
    assert_eq!(received[0].authorization.as_deref(), Some("Bearer key-123"));
    assert_eq!(received[0].organization.as_deref(), Some("org-9"));
    assert_eq!(received[0].content_type.as_deref(), Some("application/json"));
    assert_eq!(received[0].body["organization_id"], json!("org-9"));
}

#[tokio::test]
async fn test_error_status_is_a_response() {
    let state = ServerState::new();
    state.status.store(500, Ordering::Relaxed);
    let addr = serve(state.clone()).await;
    let config = config(addr);
    let transport = HttpTransport::new(&config).unwrap();

    let response = transport
        .send(request(config.spans_url(), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(response.body, "rejected");
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = config(addr);
    let transport = HttpTransport::new(&config).unwrap();
    let err = transport
        .send(request(config.spans_url(), json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_request_timeout() {
    let addr = serve(ServerState::new()).await;
    let config = config(addr).with_request_timeout(Duration::from_millis(100));
    let transport = HttpTransport::new(&config).unwrap();

    let err = transport
        .send(request(format!("http://{addr}/slow"), json!({})))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
}

#[tokio::test]
async fn test_unreadable_body_keeps_status() {
    // Promises more body than it sends, then hangs up.
    const TRUNCATED: &[u8] =
        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial";
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = socket.write_all(TRUNCATED).await;
        let _ = socket.shutdown().await;
    });

    let config = config(addr);
    let transport = HttpTransport::new(&config).unwrap();
    let response = transport
        .send(request(config.spans_url(), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status, 500);
    assert!(response.body.is_empty());
    assert!(!response.is_success());
}

#[test]
fn test_service_end_to_end() {
    // The server gets its own runtime; the relay brings another.
    let server = tokio::runtime::Runtime::new().unwrap();
    let state = ServerState::new();
    let addr = server.block_on(serve(state.clone()));

    let relay = RelayService::start(
        config(addr)
            .with_batch_size(5)
            .with_flush_interval(Duration::from_secs(3600)),
    )
    .unwrap();

    let mut span = TraceSpan::new("s1", "trace-1", "answer");
    relay.queue_span(&mut span, SpanState::Input);
    span.set_output("done");
    span.finish();
    relay.queue_span(&mut span, SpanState::Completed);

    let mut run = EvaluationRun::default();
    run.insert("eval_name", "relevance");
    relay.queue_evaluation_run(run, "s1", &span);
    relay.shutdown();

    let received = state.received();
    assert_eq!(received.len(), 2);

    let spans = received
        .iter()
        .find(|r| r.path == "/traces/spans/batch/")
        .unwrap();
    let states: Vec<_> = spans.body["spans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["span_state"].as_str().unwrap())
        .collect();
    assert_eq!(states, vec!["input", "completed"]);

    let runs = received
        .iter()
        .find(|r| r.path == "/traces/evaluation_runs/batch/")
        .unwrap();
    let entry = &runs.body["evaluation_entries"][0];
    assert_eq!(entry["associated_span"]["span_id"], json!("s1"));
    assert_eq!(entry["evaluation_run"], json!({"eval_name": "relevance"}));
    assert_eq!(runs.authorization.as_deref(), Some("Bearer key-123"));
    assert_eq!(relay.metrics().snapshot().batches_delivered, 2);
}
