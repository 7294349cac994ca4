//! The queue's unit of work.

use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Which endpoint an envelope is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Span,
    EvaluationRun,
}

/// Payload of an envelope. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopePayload {
    /// Span snapshot including `span_state` and `queued_at`.
    Span(Map<String, Value>),
    /// Evaluation-run fields with a back-reference to the span and a copy of
    /// the span's data taken at enqueue time.
    EvaluationRun {
        run: Map<String, Value>,
        associated_span_id: String,
        span_data: Map<String, Value>,
    },
}

/// A tagged payload plus the time it was enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub payload: EnvelopePayload,
    /// Unix seconds.
    pub enqueued_at: f64,
}

impl Envelope {
    pub fn span(snapshot: Map<String, Value>) -> Self {
        Self {
            payload: EnvelopePayload::Span(snapshot),
            enqueued_at: unix_timestamp(),
        }
    }

    pub fn evaluation_run(
        run: Map<String, Value>,
        associated_span_id: impl Into<String>,
        span_data: Map<String, Value>,
    ) -> Self {
        Self {
            payload: EnvelopePayload::EvaluationRun {
                run,
                associated_span_id: associated_span_id.into(),
                span_data,
            },
            enqueued_at: unix_timestamp(),
        }
    }

    #[inline]
    pub fn kind(&self) -> EnvelopeKind {
        match self.payload {
            EnvelopePayload::Span(_) => EnvelopeKind::Span,
            EnvelopePayload::EvaluationRun { .. } => EnvelopeKind::EvaluationRun,
        }
    }
}

/// Current wall-clock time as unix seconds.
pub(crate) fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|e| {
            warn!("System clock appears to be before UNIX epoch: {}", e);
            std::time::Duration::ZERO
        })
        .as_secs_f64()
}
