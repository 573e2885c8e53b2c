//! Output artifacts read from a prompt's history record.

use serde::{Deserialize, Serialize};

/// A file written by the service, addressable through `GET /view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output`, `temp` or `input`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

impl ArtifactRef {
    pub fn is_video(&self) -> bool {
        let lower = self.filename.to_ascii_lowercase();
        [".mp4", ".webm", ".mov", ".gif", ".webp", ".mkv"]
            .iter()
            .any(|ext| lower.ends_with(ext))
    }
}

/// Everything a finished prompt produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutputs {
    pub prompt_id: String,
    pub artifacts: Vec<ArtifactRef>,
}

impl ExecutionOutputs {
    /// First video artifact, preferring persisted outputs over temp previews.
    pub fn primary_video(&self) -> Option<&ArtifactRef> {
        self.first_matching(ArtifactRef::is_video)
    }

    /// First still-image artifact.
    pub fn primary_image(&self) -> Option<&ArtifactRef> {
        self.first_matching(|a| !a.is_video())
    }

    fn first_matching(&self, pred: impl Fn(&ArtifactRef) -> bool) -> Option<&ArtifactRef> {
        self.artifacts
            .iter()
            .filter(|a| pred(a))
            .min_by_key(|a| a.kind != "output")
    }
}

/// Terminal state of a prompt according to its history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    /// No record yet: still queued or running.
    Pending,
    Succeeded(Vec<ArtifactRef>),
    Failed(String),
}

/// Output list keys, in preference order.
const OUTPUT_KEYS: [&str; 3] = ["gifs", "videos", "images"];

/// Interpret `GET /history/{prompt_id}`.
///
/// Nodes are visited in ascending numeric id order so the artifact list
/// is stable across calls.
pub fn parse_history(history: &serde_json::Value, prompt_id: &str) -> HistoryState {
    let Some(entry) = history.get(prompt_id) else {
        return HistoryState::Pending;
    };

    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(|s| s.as_str());
    if status_str == Some("error") {
        return HistoryState::Failed(history_error_message(status));
    }
    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(|c| c.as_bool())
        .unwrap_or(true);
    if !completed {
        return HistoryState::Pending;
    }

    let mut nodes: Vec<(&String, &serde_json::Value)> = entry
        .get("outputs")
        .and_then(|o| o.as_object())
        .map(|o| o.iter().collect())
        .unwrap_or_default();
    nodes.sort_by_key(|(id, _)| id.parse::<u64>().unwrap_or(u64::MAX));

    let mut artifacts = Vec::new();
    for (_, output) in nodes {
        for key in OUTPUT_KEYS {
            if let Some(items) = output.get(key).and_then(|v| v.as_array()) {
                artifacts.extend(
                    items
                        .iter()
                        .filter_map(|item| serde_json::from_value::<ArtifactRef>(item.clone()).ok()),
                );
            }
        }
    }
    HistoryState::Succeeded(artifacts)
}

/// Pull the exception text out of a failed history status.
fn history_error_message(status: Option<&serde_json::Value>) -> String {
    status
        .and_then(|s| s.get("messages"))
        .and_then(|m| m.as_array())
        .and_then(|messages| {
            messages.iter().find_map(|m| {
                let pair = m.as_array()?;
                if pair.first()?.as_str()? != "execution_error" {
                    return None;
                }
                pair.get(1)?
                    .get("exception_message")?
                    .as_str()
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| "Execution failed".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_entry_is_pending() {
        assert_eq!(parse_history(&json!({}), "p1"), HistoryState::Pending);
    }

    #[test]
    fn artifacts_are_collected_in_node_order() {
        let history = json!({
            "p1": {
                "status": {"status_str": "success", "completed": true},
                "outputs": {
                    "13": {"gifs": [{"filename": "clip_00001.mp4", "subfolder": "", "type": "output"}]},
                    "9": {"images": [{"filename": "preview.png", "subfolder": "", "type": "temp"}]}
                }
            }
        });
        let HistoryState::Succeeded(artifacts) = parse_history(&history, "p1") else {
            panic!("expected success");
        };
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].filename, "preview.png");

        let outputs = ExecutionOutputs {
            prompt_id: "p1".into(),
            artifacts,
        };
        assert_eq!(outputs.primary_video().unwrap().filename, "clip_00001.mp4");
        assert_eq!(outputs.primary_image().unwrap().filename, "preview.png");
    }

    #[test]
    fn failed_history_carries_exception_message() {
        let history = json!({
            "p1": {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", {"prompt_id": "p1"}],
                        ["execution_error", {"prompt_id": "p1", "exception_message": "CUDA out of memory"}]
                    ]
                },
                "outputs": {}
            }
        });
        assert_eq!(
            parse_history(&history, "p1"),
            HistoryState::Failed("CUDA out of memory".into())
        );
    }

    #[test]
    fn incomplete_entry_is_pending() {
        let history = json!({"p1": {"status": {"status_str": "success", "completed": false}, "outputs": {}}});
        assert_eq!(parse_history(&history, "p1"), HistoryState::Pending);
    }
}
