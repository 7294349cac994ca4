//! Span Relay
//!
//! Background batching and delivery of trace spans and evaluation runs.
//! Instrumented code hands span snapshots and evaluation results to a
//! [`RelayService`] from any thread without blocking; a fixed pool of workers
//! batches them by size and age and posts each batch to the collection
//! service over HTTP.
//!
//! Delivery is best-effort: a failed call is logged and its batch dropped.
//! Nothing here returns an error to, or blocks, the instrumented application
//! except an explicit [`RelayService::flush`] or [`RelayService::shutdown`].
//!
//! # Ordering
//!
//! Items are batched in enqueue order per worker. With more than one worker,
//! or across batches at the remote side, no global order holds; span
//! revisions carry an `update_id` so the service can order them itself.

pub mod batch;
pub mod config;
pub mod delivery;
pub mod encode;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod queue;
pub mod service;
pub mod span;
pub mod transport;
mod worker;

// Re-export main types
pub use batch::{Batch, BatchConfig};
pub use config::RelayConfig;
pub use delivery::DeliveryClient;
pub use envelope::{Envelope, EnvelopeKind, EnvelopePayload};
pub use error::{ConfigError, DeliveryError, RelayError};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use payload::{partition, AssociatedSpan, EvaluationEntry, Partitioned};
pub use queue::EventQueue;
pub use service::{ExitGuard, RelayService};
pub use span::{EvaluationRun, SpanState, TraceSpan, RESERVED_SPAN_KEYS, TERMINAL_UPDATE_ID};
pub use transport::{HttpTransport, Transport, TransportBoxed, TransportRequest, TransportResponse};
