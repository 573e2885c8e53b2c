//! Project entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use reelforge_core::types::{DbId, Timestamp};

/// A project row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    /// Target resolution in `WxH` form.
    pub resolution: String,
    pub fps: i32,
    /// Resolution multiplier applied by long-video enhance passes.
    pub upscale_multiplier: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub resolution: String,
    /// Defaults to 16 if omitted.
    pub fps: Option<i32>,
    /// Defaults to 2.0 if omitted.
    pub upscale_multiplier: Option<f64>,
}
