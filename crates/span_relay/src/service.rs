//! Lifecycle controller.
//!
//! [`RelayService`] owns the queue, the worker pool and a dedicated tokio
//! runtime the workers run on. Producer calls never block. `flush` and
//! `shutdown` block only the calling thread, so they can be used from plain
//! threads as well as from inside another runtime.
//!
//! ```rust,ignore
//! let service = Arc::new(RelayService::start(RelayConfig::from_env())?);
//! let _guard = service.exit_guard(); // shut down when main returns
//!
//! let mut span = TraceSpan::new("span-1", "trace-1", "handler");
//! service.queue_span(&mut span, SpanState::Input);
//! span.finish();
//! service.queue_span(&mut span, SpanState::Completed);
//! ```

use crate::batch::BatchConfig;
use crate::config::RelayConfig;
use crate::delivery::DeliveryClient;
use crate::envelope::Envelope;
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::queue::EventQueue;
use crate::span::{EvaluationRun, SpanState, TraceSpan};
use crate::transport::{HttpTransport, TransportBoxed};
use crate::worker::Worker;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background batching and delivery service.
pub struct RelayService {
    config: RelayConfig,
    queue: Arc<EventQueue>,
    metrics: Arc<RelayMetrics>,
    shutdown: AtomicBool,
    runtime: Mutex<Option<Runtime>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayService {
    /// Starts the service with the HTTP transport.
    pub fn start(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Starts the service with a caller-provided transport.
    pub fn with_transport(
        config: RelayConfig,
        transport: Arc<dyn TransportBoxed>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let num_workers = config.effective_workers();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_workers)
            .thread_name("span-relay-worker")
            .enable_all()
            .build()?;

        let queue = Arc::new(EventQueue::new());
        let metrics = Arc::new(RelayMetrics::default());
        let delivery = Arc::new(DeliveryClient::new(
            &config,
            transport,
            Arc::clone(&metrics),
        ));
        let batch_config = BatchConfig::from(&config);

        let workers = (0..num_workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&delivery),
                    batch_config,
                    config.idle_timeout,
                );
                runtime.spawn(worker.run())
            })
            .collect();

        info!(
            workers = num_workers,
            batch_size = batch_config.batch_size,
            flush_interval_ms = batch_config.flush_interval.as_millis() as u64,
            "Span relay started"
        );

        Ok(Self {
            config,
            queue,
            metrics,
            shutdown: AtomicBool::new(false),
            runtime: Mutex::new(Some(runtime)),
            workers: Mutex::new(workers),
        })
    }

    /// Queues a snapshot of `span` taken at `state`.
    ///
    /// Advances the span's update id first: `Completed` assigns the terminal
    /// id, any other state the next revision. After shutdown this does nothing,
    /// and the span is left untouched.
    pub fn queue_span(&self, span: &mut TraceSpan, state: SpanState) {
        if self.is_shutdown() {
            self.reject("span");
            return;
        }

        let previous = span.update_id;
        match state {
            SpanState::Completed => span.set_update_id_to_terminal(),
            SpanState::Input | SpanState::Output => span.increment_update_id(),
        }

        let mut snapshot = span.snapshot();
        snapshot.insert("span_state".to_string(), Value::from(state.as_str()));

        if self.queue.enqueue(Envelope::span(snapshot)) {
            self.metrics.record_span_enqueued();
        } else {
            // closed after the shutdown check
            span.update_id = previous;
            self.reject("span");
        }
    }

    /// Queues an evaluation run together with a copy of its span's current data.
    pub fn queue_evaluation_run(&self, run: EvaluationRun, span_id: &str, span: &TraceSpan) {
        if self.is_shutdown() {
            self.reject("evaluation_run");
            return;
        }

        let envelope = Envelope::evaluation_run(run.into_fields(), span_id, span.snapshot());
        if self.queue.enqueue(envelope) {
            self.metrics.record_evaluation_run_enqueued();
        } else {
            self.reject("evaluation_run");
        }
    }

    fn reject(&self, kind: &'static str) {
        self.metrics.record_rejected();
        debug!(kind, "Relay is shut down, dropping item");
    }

    /// Blocks until every item queued so far has been delivered or dropped.
    ///
    /// Items queued concurrently may extend the wait. No-op after shutdown.
    pub fn flush(&self) {
        if self.is_shutdown() {
            return;
        }
        self.queue.join();
    }

    /// Like [`flush`](Self::flush) but gives up after `timeout`.
    ///
    /// Returns `true` if the queue was fully processed.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        if self.is_shutdown() {
            return self.queue.unfinished() == 0;
        }
        self.queue.join_timeout(timeout)
    }

    /// Stops accepting items, delivers what is queued and stops the workers.
    ///
    /// Idempotent. The final flush is bounded by `shutdown_timeout`.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        self.queue.close();
        if !self.queue.join_timeout(self.config.shutdown_timeout) {
            warn!(
                unfinished = self.queue.unfinished(),
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Shutdown flush timed out, remaining items dropped"
            );
        }

        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Some(runtime) = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            runtime.shutdown_background();
        }

        let metrics = self.metrics.snapshot();
        info!(
            spans_delivered = metrics.spans_delivered,
            evaluation_runs_delivered = metrics.evaluation_runs_delivered,
            delivery_failures = metrics.delivery_failures,
            "Span relay shut down"
        );
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Items waiting in the queue, not counting batches being delivered.
    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    /// Items queued but not yet delivered or dropped.
    pub fn pending(&self) -> usize {
        self.queue.unfinished()
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns a guard that shuts the service down when dropped.
    ///
    /// Keep it alive for the duration of `main` so in-flight telemetry is
    /// flushed when the host exits normally.
    pub fn exit_guard(self: &Arc<Self>) -> ExitGuard {
        ExitGuard {
            service: Arc::clone(self),
        }
    }
}

impl Drop for RelayService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Process-exit hook for a [`RelayService`].
#[must_use = "the service shuts down when the guard is dropped"]
pub struct ExitGuard {
    service: Arc<RelayService>,
}

impl ExitGuard {
    pub fn service(&self) -> &Arc<RelayService> {
        &self.service
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}
