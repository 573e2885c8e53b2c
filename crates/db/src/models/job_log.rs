//! Append-only job log lines.

use serde::Serialize;
use sqlx::FromRow;
use reelforge_core::types::{DbId, Timestamp};

/// A row from the `job_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobLog {
    pub id: DbId,
    pub job_id: DbId,
    pub level: String,
    pub message: String,
    pub stage: Option<String>,
    pub segment: Option<i32>,
    pub total_segments: Option<i32>,
    pub created_at: Timestamp,
}

/// DTO for appending a log line.
#[derive(Debug, Clone, Default)]
pub struct NewJobLog {
    pub job_id: DbId,
    pub level: String,
    pub message: String,
    pub stage: Option<String>,
    pub segment: Option<i32>,
    pub total_segments: Option<i32>,
}

impl NewJobLog {
    pub fn new(job_id: DbId, level: &str, message: impl Into<String>) -> Self {
        Self {
            job_id,
            level: level.to_string(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn segment(mut self, segment: u32, total_segments: u32) -> Self {
        self.segment = Some(segment as i32);
        self.total_segments = Some(total_segments as i32);
        self
    }
}
