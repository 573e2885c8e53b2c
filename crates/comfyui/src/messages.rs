//! ComfyUI WebSocket message types and parser.
//!
//! Frames have the shape `{"type": "<kind>", "data": {...}}`. Kinds this
//! client does not model (preview images, extension telemetry) fail to
//! parse and are skipped by the caller.

use serde::Deserialize;

/// Known ComfyUI WebSocket message kinds.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Server status broadcast (queue depth).
    #[serde(rename = "status")]
    Status(StatusData),

    #[serde(rename = "execution_start")]
    ExecutionStart(PromptData),

    /// Nodes skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A node started executing; `node: null` means the prompt finished.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step progress inside a long-running node (e.g. the sampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    #[serde(rename = "execution_success")]
    ExecutionSuccess(PromptData),

    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),

    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(InterruptedData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptData {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: Option<String>,
}

/// Step-level progress. Newer servers tag it with the prompt and node.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i32,
    pub max: i32,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub output: serde_json::Value,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptedData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

impl ComfyUIMessage {
    /// Prompt the message refers to, when it says.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            ComfyUIMessage::Status(_) => None,
            ComfyUIMessage::ExecutionStart(d) | ComfyUIMessage::ExecutionSuccess(d) => {
                Some(&d.prompt_id)
            }
            ComfyUIMessage::ExecutionCached(d) => Some(&d.prompt_id),
            ComfyUIMessage::Executing(d) => d.prompt_id.as_deref(),
            ComfyUIMessage::Progress(d) => d.prompt_id.as_deref(),
            ComfyUIMessage::Executed(d) => Some(&d.prompt_id),
            ComfyUIMessage::ExecutionError(d) => Some(&d.prompt_id),
            ComfyUIMessage::ExecutionInterrupted(d) => Some(&d.prompt_id),
        }
    }

    /// Whether the message may concern `prompt_id`.
    ///
    /// Untagged messages are attributed to the watched prompt since the
    /// connection's client id only receives its own executions.
    pub fn concerns(&self, prompt_id: &str) -> bool {
        self.prompt_id().map_or(true, |id| id == prompt_id)
    }
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_status_message() {
        let json = r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}},"sid":"abc"}}"#;
        let msg = parse_message(json).unwrap();
        assert_matches!(msg, ComfyUIMessage::Status(d) if d.status.exec_info.queue_remaining == 3);
    }

    #[test]
    fn parse_executing_finished() {
        let json = r#"{"type":"executing","data":{"node":null,"prompt_id":"xyz"}}"#;
        let msg = parse_message(json).unwrap();
        assert_eq!(msg.prompt_id(), Some("xyz"));
        assert_matches!(msg, ComfyUIMessage::Executing(d) if d.node.is_none());
    }

    #[test]
    fn parse_legacy_progress_without_prompt() {
        let json = r#"{"type":"progress","data":{"value":5,"max":20}}"#;
        let msg = parse_message(json).unwrap();
        assert!(msg.concerns("any"));
        assert_matches!(msg, ComfyUIMessage::Progress(d) if d.value == 5 && d.max == 20);
    }

    #[test]
    fn parse_tagged_progress() {
        let json = r#"{"type":"progress","data":{"value":1,"max":30,"prompt_id":"p1","node":"6"}}"#;
        let msg = parse_message(json).unwrap();
        assert!(msg.concerns("p1"));
        assert!(!msg.concerns("p2"));
        assert_matches!(msg, ComfyUIMessage::Progress(d) if d.node.as_deref() == Some("6"));
    }

    #[test]
    fn parse_execution_success() {
        let json = r#"{"type":"execution_success","data":{"prompt_id":"p1","timestamp":1}}"#;
        assert_matches!(parse_message(json).unwrap(), ComfyUIMessage::ExecutionSuccess(d) if d.prompt_id == "p1");
    }

    #[test]
    fn parse_execution_error_with_null_node() {
        let json = r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":null,"exception_message":"CUDA out of memory","exception_type":"torch.OutOfMemoryError"}}"#;
        let msg = parse_message(json).unwrap();
        assert_matches!(msg, ComfyUIMessage::ExecutionError(d) => {
            assert!(d.node_id.is_none());
            assert_eq!(d.exception_message, "CUDA out of memory");
        });
    }

    #[test]
    fn parse_execution_interrupted() {
        let json = r#"{"type":"execution_interrupted","data":{"prompt_id":"p9","node_id":"11","node_type":"KSampler","executed":[]}}"#;
        assert_matches!(parse_message(json).unwrap(), ComfyUIMessage::ExecutionInterrupted(d) if d.prompt_id == "p9");
    }

    #[test]
    fn parse_executed_message() {
        let json = r#"{"type":"executed","data":{"node":"9","output":{"gifs":[{"filename":"out.mp4"}]},"prompt_id":"abc"}}"#;
        assert_matches!(parse_message(json).unwrap(), ComfyUIMessage::Executed(d) if d.node == "9");
    }

    #[test]
    fn unknown_type_and_garbage_are_errors() {
        assert!(parse_message(r#"{"type":"crystools.monitor","data":{}}"#).is_err());
        assert!(parse_message("not json at all").is_err());
    }
}
