//! Execution events surfaced to callers of the inference service.

use serde::Serialize;

/// One of the two event kinds reported while a graph executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceEvent {
    /// `value` of `max` steps done inside the current node.
    StepProgress {
        value: i64,
        max: i64,
        node: Option<String>,
    },
    /// The service moved on to another node.
    NodeExecuting { node: String },
}
