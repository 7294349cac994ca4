//! Span snapshots and evaluation-run records as handed to the relay.
//!
//! The instrumentation layer owns live spans. The relay only needs a
//! serializable view of them plus the update-id bookkeeping that lets the
//! remote side order revisions of the same span.

use crate::encode::{to_map_lossy, to_value_lossy};
use crate::envelope::unix_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Update id carried by the final revision of a span.
///
/// Kept within the 53-bit range so JSON consumers read it exactly.
pub const TERMINAL_UPDATE_ID: u64 = i32::MAX as u64;

/// Keys owned by the relay in a span snapshot; attributes cannot use them.
pub const RESERVED_SPAN_KEYS: [&str; 14] = [
    "span_id",
    "trace_id",
    "parent_span_id",
    "function",
    "depth",
    "created_at",
    "duration",
    "span_type",
    "inputs",
    "output",
    "error",
    "update_id",
    "span_state",
    "queued_at",
];

#[inline]
fn is_reserved_key(key: &str) -> bool {
    RESERVED_SPAN_KEYS.contains(&key)
}

/// Lifecycle stage a span snapshot was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanState {
    Input,
    Output,
    Completed,
}

impl SpanState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SpanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of instrumented execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub function: String,
    pub depth: u32,
    /// Unix seconds.
    pub created_at: f64,
    /// Seconds; `None` while the span is open.
    pub duration: Option<f64>,
    pub span_type: String,
    pub inputs: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<Value>,
    /// Revision marker, see [`TraceSpan::increment_update_id`].
    pub update_id: u64,
    /// Free-form fields set by instrumentation.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl TraceSpan {
    /// Creates an open span started now.
    pub fn new(
        span_id: impl Into<String>,
        trace_id: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            parent_span_id: None,
            function: function.into(),
            depth: 0,
            created_at: unix_timestamp(),
            duration: None,
            span_type: "span".to_string(),
            inputs: None,
            output: None,
            error: None,
            update_id: 0,
            attributes: Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>, depth: u32) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self.depth = depth;
        self
    }

    pub fn with_span_type(mut self, span_type: impl Into<String>) -> Self {
        self.span_type = span_type.into();
        self
    }

    /// Advances to the next revision.
    ///
    /// Never reaches [`TERMINAL_UPDATE_ID`]; a terminal span stays terminal.
    pub fn increment_update_id(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.update_id = (self.update_id + 1).min(TERMINAL_UPDATE_ID - 1);
    }

    /// Marks this revision as the final one.
    pub fn set_update_id_to_terminal(&mut self) {
        self.update_id = TERMINAL_UPDATE_ID;
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.update_id == TERMINAL_UPDATE_ID
    }

    pub fn set_inputs<T: Serialize + fmt::Debug + ?Sized>(&mut self, inputs: &T) {
        self.inputs = Some(to_value_lossy(inputs));
    }

    pub fn set_output<T: Serialize + fmt::Debug + ?Sized>(&mut self, output: &T) {
        self.output = Some(to_value_lossy(output));
    }

    pub fn set_error<T: Serialize + fmt::Debug + ?Sized>(&mut self, error: &T) {
        self.error = Some(to_value_lossy(error));
    }

    /// Stores a free-form field. A value that cannot be encoded is kept as text.
    ///
    /// Keys in [`RESERVED_SPAN_KEYS`] are ignored.
    pub fn set_attribute<T: Serialize + fmt::Debug + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) {
        let key = key.into();
        if is_reserved_key(&key) {
            debug!(key = %key, span_id = %self.span_id, "Ignoring attribute with reserved key");
            return;
        }
        self.attributes.insert(key, to_value_lossy(value));
    }

    /// Records the span's duration from its start until now.
    pub fn finish(&mut self) {
        self.duration = Some((unix_timestamp() - self.created_at).max(0.0));
    }

    /// Owned JSON view of the span as it is right now.
    ///
    /// Typed fields always win over attributes of the same name.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .attributes
            .iter()
            .filter(|(key, _)| !is_reserved_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        map.extend(to_map_lossy(&SpanFields::from(self)));
        map
    }
}

/// The typed part of a [`TraceSpan`], without its attributes.
#[derive(Debug, Serialize)]
struct SpanFields<'a> {
    span_id: &'a str,
    trace_id: &'a str,
    parent_span_id: Option<&'a str>,
    function: &'a str,
    depth: u32,
    created_at: f64,
    duration: Option<f64>,
    span_type: &'a str,
    inputs: Option<&'a Value>,
    output: Option<&'a Value>,
    error: Option<&'a Value>,
    update_id: u64,
}

impl<'a> From<&'a TraceSpan> for SpanFields<'a> {
    fn from(span: &'a TraceSpan) -> Self {
        Self {
            span_id: &span.span_id,
            trace_id: &span.trace_id,
            parent_span_id: span.parent_span_id.as_deref(),
            function: &span.function,
            depth: span.depth,
            created_at: span.created_at,
            duration: span.duration,
            span_type: &span.span_type,
            inputs: span.inputs.as_ref(),
            output: span.output.as_ref(),
            error: span.error.as_ref(),
            update_id: span.update_id,
        }
    }
}

/// Result record of an evaluation attached to a span.
///
/// Opaque to the relay apart from the keys it adds when delivering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationRun {
    fields: Map<String, Value>,
}

impl EvaluationRun {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builds a record from any serializable evaluation-run type.
    pub fn from_serialize<T: Serialize + fmt::Debug + ?Sized>(run: &T) -> Self {
        Self {
            fields: to_map_lossy(run),
        }
    }

    pub fn insert<T: Serialize + fmt::Debug + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) {
        self.fields.insert(key.into(), to_value_lossy(value));
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for EvaluationRun {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_id_progression() {
        let mut span = TraceSpan::new("s1", "t1", "handler");
        assert_eq!(span.update_id, 0);

        span.increment_update_id();
        span.increment_update_id();
        assert_eq!(span.update_id, 2);

        span.set_update_id_to_terminal();
        assert!(span.is_terminal());

        // terminal revisions stay terminal
        span.increment_update_id();
        assert_eq!(span.update_id, TERMINAL_UPDATE_ID);
    }

    #[test]
    fn test_increment_never_reaches_terminal() {
        let mut span = TraceSpan::new("s1", "t1", "handler");
        span.update_id = TERMINAL_UPDATE_ID - 1;
        span.increment_update_id();
        assert_eq!(span.update_id, TERMINAL_UPDATE_ID - 1);
        assert!(!span.is_terminal());
    }

    #[test]
    fn test_snapshot_flattens_attributes() {
        let mut span = TraceSpan::new("s1", "t1", "handler").with_parent("s0", 1);
        span.set_attribute("model", "gpt");
        span.set_inputs(&json!({"q": "hi"}));

        let snapshot = span.snapshot();
        assert_eq!(snapshot["span_id"], json!("s1"));
        assert_eq!(snapshot["parent_span_id"], json!("s0"));
        assert_eq!(snapshot["model"], json!("gpt"));
        assert_eq!(snapshot["inputs"], json!({"q": "hi"}));
        assert_eq!(snapshot["update_id"], json!(0));
    }

    #[test]
    fn test_snapshot_is_detached_from_live_span() {
        let mut span = TraceSpan::new("s1", "t1", "handler");
        let snapshot = span.snapshot();
        span.set_output("later");
        assert_eq!(snapshot["output"], Value::Null);
    }

    #[test]
    fn test_reserved_attributes_cannot_shadow_fields() {
        let mut span = TraceSpan::new("s1", "t1", "handler");
        span.set_attribute("update_id", &3);
        span.set_attribute("span_id", "other");
        span.set_attribute("queued_at", &1.0);
        span.set_attribute("model", "gpt");
        assert_eq!(span.attributes.len(), 1);

        // written directly, bypassing set_attribute
        span.attributes.insert("update_id".to_string(), json!(7));
        span.attributes.insert("span_state".to_string(), json!("input"));

        span.set_update_id_to_terminal();
        let snapshot = span.snapshot();
        assert_eq!(snapshot["update_id"], json!(TERMINAL_UPDATE_ID));
        assert_eq!(snapshot["span_id"], json!("s1"));
        assert_eq!(snapshot["model"], json!("gpt"));
        assert!(!snapshot.contains_key("queued_at"));
        assert!(!snapshot.contains_key("span_state"));
    }

    #[test]
    fn test_span_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(SpanState::Completed).unwrap(), json!("completed"));
        assert_eq!(SpanState::Input.to_string(), "input");
    }

    #[test]
    fn test_evaluation_run_from_struct() {
        #[derive(Debug, Serialize)]
        struct Run {
            name: &'static str,
            scorers: Vec<&'static str>,
        }

        let run = EvaluationRun::from_serialize(&Run {
            name: "faithfulness",
            scorers: vec!["a", "b"],
        });
        assert_eq!(run.fields()["name"], json!("faithfulness"));
        assert_eq!(run.fields()["scorers"], json!(["a", "b"]));
    }
}
