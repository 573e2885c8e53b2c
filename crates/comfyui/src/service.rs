//! Inference Client: submit a graph, follow its execution, collect outputs.
//!
//! Workers depend on the [`InferenceService`] trait so tests can run the
//! pipelines against a fake. [`ComfyUIService`] is the real
//! implementation: step progress arrives on a per-submission WebSocket and
//! the final outputs are read from the prompt's history record, which is
//! also polled when the socket drops.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ws_url_from_http, ComfyUIClient, ComfyUIClientError, ComfyUIConnection};
use crate::events::InferenceEvent;
use crate::messages::{parse_message, ComfyUIMessage};
use crate::outputs::{parse_history, ArtifactRef, ExecutionOutputs, HistoryState};
use crate::workflow::Graph;

/// Default interval between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The service could not be reached at all.
    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Inference timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The graph was rejected or failed while executing.
    #[error("Inference failed: {0}")]
    Execution(String),

    /// Execution succeeded but produced nothing usable.
    #[error("Inference produced no artifact: {0}")]
    ArtifactMissing(String),

    #[error("Inference transport error: {0}")]
    Transport(String),
}

impl From<ComfyUIApiError> for InferenceError {
    fn from(err: ComfyUIApiError) -> Self {
        if err.is_unreachable() {
            InferenceError::ServiceUnavailable(err.to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

impl From<ComfyUIClientError> for InferenceError {
    fn from(err: ComfyUIClientError) -> Self {
        match err {
            ComfyUIClientError::Connection(msg) => InferenceError::ServiceUnavailable(msg),
            ComfyUIClientError::Protocol(msg) => InferenceError::Transport(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A submitted execution.
///
/// Carries the event connection the prompt was submitted under, when one
/// exists; without it completion is detected by polling history only.
pub struct ExecutionHandle {
    pub prompt_id: String,
    connection: Option<ComfyUIConnection>,
}

impl ExecutionHandle {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            connection: None,
        }
    }

    fn with_connection(prompt_id: String, connection: ComfyUIConnection) -> Self {
        Self {
            prompt_id,
            connection: Some(connection),
        }
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("prompt_id", &self.prompt_id)
            .field(
                "client_id",
                &self.connection.as_ref().map(|c| c.client_id.as_str()),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Progress callback invoked for every execution event.
pub type EventFn<'a> = &'a (dyn Fn(InferenceEvent) + Send + Sync);

#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;

    /// Queue a graph for execution.
    async fn submit(&self, graph: &Graph) -> Result<ExecutionHandle, InferenceError>;

    /// Wait until the execution finishes, reporting events as they arrive.
    ///
    /// On timeout the running execution is interrupted and
    /// [`InferenceError::Timeout`] is returned.
    async fn await_completion(
        &self,
        handle: ExecutionHandle,
        on_event: EventFn<'_>,
        timeout: Duration,
    ) -> Result<ExecutionOutputs, InferenceError>;

    /// Download one produced artifact.
    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, InferenceError>;

    /// Make a local image available to graphs; returns the name to put in
    /// an image-loading node.
    async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<String, InferenceError>;

    /// Ask the service to drop loaded models. Failures are only logged.
    async fn release_memory(&self);
}

// ---------------------------------------------------------------------------
// ComfyUI implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ComfyUIService {
    api: ComfyUIApi,
    client: ComfyUIClient,
    poll_interval: Duration,
}

/// How the event stream ended.
enum SocketOutcome {
    Finished,
    Closed,
}

impl ComfyUIService {
    /// * `api_url` - Base HTTP URL; the WebSocket URL is derived from it.
    pub fn new(api_url: &str) -> Self {
        let api = ComfyUIApi::new(api_url.to_string());
        let client = ComfyUIClient::new(ws_url_from_http(api.api_url()));
        Self {
            api,
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    async fn wait(
        &self,
        handle: ExecutionHandle,
        on_event: EventFn<'_>,
    ) -> Result<ExecutionOutputs, InferenceError> {
        let ExecutionHandle {
            prompt_id,
            connection,
        } = handle;

        if let Some(mut connection) = connection {
            match watch_socket(&mut connection, &prompt_id, on_event).await? {
                SocketOutcome::Finished => {
                    tracing::debug!(prompt_id = %prompt_id, "Execution finished");
                }
                SocketOutcome::Closed => {
                    tracing::warn!(
                        prompt_id = %prompt_id,
                        "Event stream ended early, polling history",
                    );
                }
            }
            let _ = connection.ws_stream.close(None).await;
        }

        let artifacts = self.poll_history(&prompt_id).await?;
        if artifacts.is_empty() {
            return Err(InferenceError::ArtifactMissing(format!(
                "prompt {prompt_id} finished without outputs"
            )));
        }
        Ok(ExecutionOutputs {
            prompt_id,
            artifacts,
        })
    }

    async fn poll_history(&self, prompt_id: &str) -> Result<Vec<ArtifactRef>, InferenceError> {
        loop {
            let history = self.api.get_history(prompt_id).await?;
            match parse_history(&history, prompt_id) {
                HistoryState::Succeeded(artifacts) => return Ok(artifacts),
                HistoryState::Failed(message) => return Err(InferenceError::Execution(message)),
                HistoryState::Pending => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// Relay events for `prompt_id` until it finishes or the socket closes.
async fn watch_socket(
    connection: &mut ComfyUIConnection,
    prompt_id: &str,
    on_event: EventFn<'_>,
) -> Result<SocketOutcome, InferenceError> {
    while let Some(frame) = connection.ws_stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            // Preview images and keep-alives.
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        let message = match parse_message(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::trace!(error = %e, "Skipping unrecognized ComfyUI message");
                continue;
            }
        };
        if !message.concerns(prompt_id) {
            continue;
        }

        match message {
            ComfyUIMessage::Progress(data) => on_event(InferenceEvent::StepProgress {
                value: data.value as i64,
                max: data.max as i64,
                node: data.node,
            }),
            ComfyUIMessage::Executing(data) => match data.node {
                Some(node) => on_event(InferenceEvent::NodeExecuting { node }),
                None => return Ok(SocketOutcome::Finished),
            },
            ComfyUIMessage::ExecutionSuccess(_) => return Ok(SocketOutcome::Finished),
            ComfyUIMessage::ExecutionError(data) => {
                tracing::error!(
                    prompt_id = %prompt_id,
                    node_type = ?data.node_type,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "Execution error",
                );
                return Err(InferenceError::Execution(data.exception_message));
            }
            ComfyUIMessage::ExecutionInterrupted(_) => {
                return Err(InferenceError::Execution("Execution was interrupted".into()));
            }
            ComfyUIMessage::ExecutionCached(data) => {
                tracing::debug!(prompt_id = %prompt_id, nodes = data.nodes.len(), "Execution used cache");
            }
            ComfyUIMessage::Status(_)
            | ComfyUIMessage::ExecutionStart(_)
            | ComfyUIMessage::Executed(_) => {}
        }
    }
    Ok(SocketOutcome::Closed)
}

#[async_trait]
impl InferenceService for ComfyUIService {
    async fn is_available(&self) -> bool {
        match self.api.system_stats().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "ComfyUI availability probe failed");
                false
            }
        }
    }

    async fn submit(&self, graph: &Graph) -> Result<ExecutionHandle, InferenceError> {
        // Connect first so no event for the new prompt is missed.
        let connection = self.client.connect().await?;
        let response = self
            .api
            .submit_workflow(&graph.to_json(), &connection.client_id)
            .await?;

        let rejected = response
            .node_errors
            .as_object()
            .is_some_and(|errors| !errors.is_empty());
        if rejected {
            return Err(InferenceError::Execution(format!(
                "Graph rejected: {}",
                response.node_errors
            )));
        }

        tracing::info!(
            prompt_id = %response.prompt_id,
            queue_position = response.number,
            nodes = graph.len(),
            "Submitted graph",
        );
        Ok(ExecutionHandle::with_connection(response.prompt_id, connection))
    }

    async fn await_completion(
        &self,
        handle: ExecutionHandle,
        on_event: EventFn<'_>,
        timeout: Duration,
    ) -> Result<ExecutionOutputs, InferenceError> {
        let prompt_id = handle.prompt_id.clone();
        match tokio::time::timeout(timeout, self.wait(handle, on_event)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(prompt_id = %prompt_id, timeout_secs = timeout.as_secs(), "Inference timed out, interrupting");
                let api = self.api.clone();
                tokio::spawn(async move {
                    if let Err(e) = api.interrupt().await {
                        tracing::warn!(error = %e, "Failed to interrupt timed-out execution");
                    }
                });
                Err(InferenceError::Timeout {
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, InferenceError> {
        Ok(self
            .api
            .view(&artifact.filename, &artifact.subfolder, &artifact.kind)
            .await?)
    }

    async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<String, InferenceError> {
        let uploaded = self.api.upload_image(bytes, filename).await?;
        Ok(uploaded.image_ref())
    }

    async fn release_memory(&self) {
        match self.api.free_memory().await {
            Ok(()) => tracing::debug!("Released inference memory"),
            Err(e) => tracing::warn!(error = %e, "Failed to release inference memory"),
        }
    }
}
