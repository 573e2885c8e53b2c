//! Failure taxonomy of a job run.

use reelforge_comfyui::InferenceError;
use reelforge_core::error::CoreError;
use reelforge_core::ffmpeg::FfmpegError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad or missing parameters.
    #[error("{0}")]
    Validation(String),

    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A wall-clock ceiling was exceeded.
    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The inference service or a subprocess reported failure.
    #[error("{0}")]
    Execution(String),

    /// A nominally successful step left no usable output behind.
    #[error("Expected output missing: {0}")]
    ArtifactMissing(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The job was cancelled while it was running.
    #[error("Job was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Stable label used in logs and job log rows.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::ServiceUnavailable(_) => "service_unavailable",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Execution(_) => "execution",
            PipelineError::ArtifactMissing(_) => "artifact_missing",
            PipelineError::FileSystem(_) => "file_system",
            PipelineError::Database(_) => "database",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => PipelineError::Validation(msg),
            CoreError::NotFound { entity, id } => {
                PipelineError::Validation(format!("{entity} with id {id} not found"))
            }
            CoreError::Conflict(msg) => PipelineError::Validation(msg),
            CoreError::Internal(msg) => PipelineError::Execution(msg),
        }
    }
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ServiceUnavailable(msg) => PipelineError::ServiceUnavailable(msg),
            InferenceError::Timeout { secs } => PipelineError::Timeout { secs },
            InferenceError::Execution(msg) | InferenceError::Transport(msg) => {
                PipelineError::Execution(msg)
            }
            InferenceError::ArtifactMissing(msg) => PipelineError::ArtifactMissing(msg),
        }
    }
}

impl From<FfmpegError> for PipelineError {
    fn from(err: FfmpegError) -> Self {
        match err {
            FfmpegError::IoError(e) => PipelineError::FileSystem(e.to_string()),
            FfmpegError::VideoNotFound(path) => {
                PipelineError::ArtifactMissing(format!("video file not found: {path}"))
            }
            FfmpegError::OutputMissing(path) => PipelineError::ArtifactMissing(path),
            FfmpegError::InvalidArgument(msg) => PipelineError::Validation(msg),
            other => PipelineError::Execution(other.to_string()),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::FileSystem(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Validation(format!("Invalid job settings: {err}"))
    }
}
