//! # Span Relay Demo
//!
//! Several producer threads trace fake request handlers: each handler queues
//! its span on entry, on output and on completion, and every few spans an
//! evaluation run is queued against the finished span.
//!
//! By default batches go to a simulated backend that fails a share of calls
//! at random. Pass `--live` to post to the collection service configured by
//! `JUDGMENT_API_URL`, `JUDGMENT_API_KEY` and `JUDGMENT_ORG_ID`.
//!
//! ```bash
//! cargo run -p span_relay --bin demo -- --quick
//! RUST_LOG=span_relay=debug cargo run -p span_relay --bin demo
//! cargo run -p span_relay --bin demo -- --live
//! ```

use rand::Rng;
use span_relay::{
    DeliveryError, EvaluationRun, RelayConfig, RelayService, SpanState, TraceSpan, Transport,
    TransportBoxed, TransportRequest, TransportResponse,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const FUNCTIONS: [&str; 5] = ["retrieve", "rerank", "generate", "summarize", "classify"];

/// Backend stand-in with random latency and failures.
struct SimulatedBackend {
    failure_rate: f64,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl SimulatedBackend {
    fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

impl Transport for SimulatedBackend {
    async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, DeliveryError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let (latency_ms, fail) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(2..20), rng.gen_bool(self.failure_rate))
        };
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if fail {
            self.failures.fetch_add(1, Ordering::Relaxed);
            Ok(TransportResponse {
                status: 503,
                body: "simulated outage".to_string(),
            })
        } else {
            Ok(TransportResponse::ok())
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Traces one fake handler call through all three states.
fn trace_call(relay: &RelayService, producer: usize, seq: usize) -> TraceSpan {
    let mut rng = rand::thread_rng();
    let function = FUNCTIONS[rng.gen_range(0..FUNCTIONS.len())];

    let mut span = TraceSpan::new(
        format!("p{producer}-s{seq}"),
        format!("trace-p{producer}"),
        function,
    )
    .with_span_type(if function == "generate" { "llm" } else { "span" });
    span.set_inputs(&serde_json::json!({ "query": format!("question {seq}") }));
    relay.queue_span(&mut span, SpanState::Input);

    thread::sleep(Duration::from_micros(rng.gen_range(50..500)));
    span.set_output(&format!("answer {seq}"));
    relay.queue_span(&mut span, SpanState::Output);

    span.finish();
    relay.queue_span(&mut span, SpanState::Completed);
    span
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let quick = args.contains(&"--quick".to_string());
    let live = args.contains(&"--live".to_string());

    let num_producers = if quick { 2 } else { 4 };
    let calls_per_producer = if quick { 25 } else { 200 };

    let config = RelayConfig::from_env();
    let backend = Arc::new(SimulatedBackend::new(0.1));
    let relay = Arc::new(if live {
        RelayService::start(config)?
    } else {
        RelayService::with_transport(config, Arc::clone(&backend) as Arc<dyn TransportBoxed>)?
    });
    let guard = relay.exit_guard();

    println!("Span relay demo");
    println!("   Mode: {}", if live { "live" } else { "simulated" });
    println!("   Producers: {num_producers}");
    println!("   Calls per producer: {calls_per_producer}");
    println!("   Batch size: {}", relay.config().batch_size);
    println!("   Flush interval: {:?}", relay.config().flush_interval);
    println!("   Workers: {}", relay.config().effective_workers());
    println!();

    let started = Instant::now();
    let producers: Vec<_> = (0..num_producers)
        .map(|producer| {
            let relay = Arc::clone(&relay);
            thread::spawn(move || {
                for seq in 0..calls_per_producer {
                    let span = trace_call(&relay, producer, seq);
                    if seq % 5 == 0 {
                        let mut run = EvaluationRun::default();
                        run.insert("eval_name", "answer_relevancy");
                        run.insert("threshold", &0.7);
                        relay.queue_evaluation_run(run, &span.span_id, &span);
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        if producer.join().is_err() {
            eprintln!("   producer thread panicked");
        }
    }
    let generation_time = started.elapsed();

    println!("   Waiting for flush ({} pending)...", relay.pending());
    relay.flush();
    drop(guard);

    let metrics = relay.metrics().snapshot();
    println!();
    println!("Results");
    println!("   Generation time:          {generation_time:>10.2?}");
    println!("   Total time:               {:>10.2?}", started.elapsed());
    println!("   Spans enqueued:           {:>10}", metrics.spans_enqueued);
    println!("   Evaluation runs enqueued: {:>10}", metrics.evaluation_runs_enqueued);
    println!("   Spans delivered:          {:>10}", metrics.spans_delivered);
    println!("   Evaluation runs delivered:{:>10}", metrics.evaluation_runs_delivered);
    println!("   Batches delivered:        {:>10}", metrics.batches_delivered);
    println!("   Delivery failures:        {:>10}", metrics.delivery_failures);
    println!("   Items dropped:            {:>10}", metrics.items_dropped);

    if !live {
        println!(
            "   Backend calls:            {:>10} ({} simulated failures)",
            backend.calls.load(Ordering::Relaxed),
            backend.failures.load(Ordering::Relaxed)
        );
    }

    Ok(())
}
