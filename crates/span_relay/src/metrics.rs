use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters shared by producers, workers and the delivery client.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Span envelopes accepted by the queue
    pub spans_enqueued: AtomicU64,
    /// Evaluation-run envelopes accepted by the queue
    pub evaluation_runs_enqueued: AtomicU64,
    /// Enqueue calls ignored because the service was shut down
    pub rejected_after_shutdown: AtomicU64,
    /// Spans the remote service acknowledged
    pub spans_delivered: AtomicU64,
    /// Evaluation runs the remote service acknowledged
    pub evaluation_runs_delivered: AtomicU64,
    /// Successful delivery calls
    pub batches_delivered: AtomicU64,
    /// Failed delivery calls (transport error, timeout or non-200)
    pub delivery_failures: AtomicU64,
    /// Items discarded as part of a failed delivery call
    pub items_dropped: AtomicU64,
}

/// Plain copy of [`RelayMetrics`] at one point in time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub spans_enqueued: u64,
    pub evaluation_runs_enqueued: u64,
    pub rejected_after_shutdown: u64,
    pub spans_delivered: u64,
    pub evaluation_runs_delivered: u64,
    pub batches_delivered: u64,
    pub delivery_failures: u64,
    pub items_dropped: u64,
}

impl MetricsSnapshot {
    /// Items that reached a delivery attempt, successful or not.
    pub fn items_attempted(&self) -> u64 {
        self.spans_delivered + self.evaluation_runs_delivered + self.items_dropped
    }
}

impl RelayMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            spans_enqueued: self.spans_enqueued.load(Ordering::Relaxed),
            evaluation_runs_enqueued: self.evaluation_runs_enqueued.load(Ordering::Relaxed),
            rejected_after_shutdown: self.rejected_after_shutdown.load(Ordering::Relaxed),
            spans_delivered: self.spans_delivered.load(Ordering::Relaxed),
            evaluation_runs_delivered: self.evaluation_runs_delivered.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_span_enqueued(&self) {
        self.spans_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evaluation_run_enqueued(&self) {
        self.evaluation_runs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected_after_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spans_delivered(&self, count: u64) {
        self.spans_delivered.fetch_add(count, Ordering::Relaxed);
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evaluation_runs_delivered(&self, count: u64) {
        self.evaluation_runs_delivered.fetch_add(count, Ordering::Relaxed);
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, dropped: u64) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        self.items_dropped.fetch_add(dropped, Ordering::Relaxed);
    }
}
