//! Clip entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use reelforge_core::types::{DbId, Timestamp};

use crate::models::status::StatusId;

/// A row from the `clips` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Clip {
    pub id: DbId,
    pub project_id: DbId,
    pub order_index: i32,
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: i32,
    pub cfg_scale: f64,
    pub seed: i64,
    pub reference_image: Option<String>,
    pub adapter_weight: Option<f64>,
    pub model_id: String,
    pub mode: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<i32>,
    pub output_path: Option<String>,
    pub output_name: Option<String>,
    pub thumbnail_path: Option<String>,
    pub thumbnail_name: Option<String>,
    pub duration_sec: Option<f64>,
    pub frame_count: Option<i32>,
    pub status_id: StatusId,
    pub job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a clip with its generation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClip {
    pub project_id: DbId,
    pub order_index: i32,
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: i32,
    pub cfg_scale: f64,
    pub seed: i64,
    pub reference_image: Option<String>,
    pub adapter_weight: Option<f64>,
    pub model_id: String,
    pub mode: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<i32>,
}

/// Output file and derived metadata written when a clip completes.
#[derive(Debug, Clone, Serialize)]
pub struct ClipOutput {
    pub output_path: String,
    pub output_name: String,
    pub thumbnail_path: Option<String>,
    pub thumbnail_name: Option<String>,
    pub duration_sec: f64,
    pub frame_count: i32,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
}
