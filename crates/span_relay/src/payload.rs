//! Batch partitioning and wire payloads.
//!
//! A drained batch is split by envelope kind, keeping relative order within
//! each kind. Evaluation runs are reshaped so the run's own fields and the
//! associated span travel as separate sub-objects.

use crate::envelope::{Envelope, EnvelopePayload};
use serde::Serialize;
use serde_json::{Map, Value};

/// Keys the relay adds to evaluation runs; never part of `evaluation_run`.
const RELAY_EVALUATION_KEYS: [&str; 3] = ["associated_span_id", "span_data", "queued_at"];

/// Body of the span batch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpansBatchPayload<'a> {
    pub spans: &'a [Map<String, Value>],
    pub organization_id: &'a str,
}

/// Body of the evaluation-run batch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRunsBatchPayload<'a> {
    pub organization_id: &'a str,
    pub evaluation_entries: &'a [EvaluationEntry],
}

/// One evaluation run with the span it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationEntry {
    pub evaluation_run: Map<String, Value>,
    pub associated_span: AssociatedSpan,
    pub queued_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociatedSpan {
    pub span_id: String,
    pub span_data: Map<String, Value>,
}

/// A batch split by kind.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Partitioned {
    pub spans: Vec<Map<String, Value>>,
    pub evaluation_entries: Vec<EvaluationEntry>,
}

impl Partitioned {
    pub fn len(&self) -> usize {
        self.spans.len() + self.evaluation_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty() && self.evaluation_entries.is_empty()
    }
}

/// Splits envelopes into span records and evaluation entries.
pub fn partition(batch: Vec<Envelope>) -> Partitioned {
    let mut out = Partitioned::default();
    for envelope in batch {
        match envelope.payload {
            EnvelopePayload::Span(mut span) => {
                span.insert("queued_at".to_string(), Value::from(envelope.enqueued_at));
                out.spans.push(span);
            }
            EnvelopePayload::EvaluationRun {
                mut run,
                associated_span_id,
                span_data,
            } => {
                for key in RELAY_EVALUATION_KEYS {
                    run.remove(key);
                }
                out.evaluation_entries.push(EvaluationEntry {
                    evaluation_run: run,
                    associated_span: AssociatedSpan {
                        span_id: associated_span_id,
                        span_data,
                    },
                    queued_at: envelope.enqueued_at,
                });
            }
        }
    }
    out
}
