//! Job entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use reelforge_core::job_type::JobType;
use reelforge_core::types::{DbId, Timestamp};

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub project_id: Option<DbId>,
    pub job_type: String,
    pub status_id: StatusId,
    pub progress_percent: i16,
    pub progress_message: Option<String>,
    /// Job-type-specific payload, later merged with derived output metadata.
    pub settings: serde_json::Value,
    /// Input clips, or for long-video jobs the produced segment clips.
    pub clip_ids: Vec<DbId>,
    pub result: Option<serde_json::Value>,
    pub output_path: Option<String>,
    pub output_file_name: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    pub fn kind(&self) -> Option<JobType> {
        JobType::parse(&self.job_type).ok()
    }
}

/// DTO for enqueueing a new job.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJob {
    pub project_id: Option<DbId>,
    pub job_type: JobType,
    pub settings: serde_json::Value,
    #[serde(default)]
    pub clip_ids: Vec<DbId>,
}

/// Output written when a job completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobOutput {
    pub output_path: Option<String>,
    pub output_file_name: Option<String>,
    pub result: serde_json::Value,
}
