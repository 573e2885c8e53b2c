//! Repository for the `clips` table.
//!
//! Status changes go through [`ClipRepo::transition`], which refuses any
//! move that [`ClipStatus::can_transition_to`] does not allow and guards
//! the update on the current status so concurrent writers cannot move a
//! clip backward.

use sqlx::PgPool;
use reelforge_core::types::DbId;

use crate::models::clip::{Clip, ClipOutput, CreateClip};
use crate::models::status::ClipStatus;

/// Column list for `clips` queries.
const COLUMNS: &str = "\
    id, project_id, order_index, prompt, negative_prompt, steps, cfg_scale, seed, \
    reference_image, adapter_weight, model_id, mode, width, height, fps, \
    output_path, output_name, thumbnail_path, thumbnail_name, \
    duration_sec, frame_count, status_id, job_id, created_at, updated_at";

/// Provides CRUD operations for clips.
pub struct ClipRepo;

impl ClipRepo {
    /// Insert a `pending` clip owned by `job_id`.
    pub async fn create_pending(
        pool: &PgPool,
        input: &CreateClip,
        job_id: Option<DbId>,
    ) -> Result<Clip, sqlx::Error> {
        let query = format!(
            "INSERT INTO clips \
                 (project_id, order_index, prompt, negative_prompt, steps, cfg_scale, seed, \
                  reference_image, adapter_weight, model_id, mode, width, height, fps, \
                  status_id, job_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(input.project_id)
            .bind(input.order_index)
            .bind(&input.prompt)
            .bind(&input.negative_prompt)
            .bind(input.steps)
            .bind(input.cfg_scale)
            .bind(input.seed)
            .bind(&input.reference_image)
            .bind(input.adapter_weight)
            .bind(&input.model_id)
            .bind(&input.mode)
            .bind(input.width)
            .bind(input.height)
            .bind(input.fps)
            .bind(ClipStatus::Pending.id())
            .bind(job_id)
            .fetch_one(pool)
            .await
    }

    /// Insert an already-finished clip (long-video segments).
    pub async fn create_completed(
        pool: &PgPool,
        input: &CreateClip,
        output: &ClipOutput,
        job_id: DbId,
    ) -> Result<Clip, sqlx::Error> {
        let query = format!(
            "INSERT INTO clips \
                 (project_id, order_index, prompt, negative_prompt, steps, cfg_scale, seed, \
                  reference_image, adapter_weight, model_id, mode, width, height, fps, \
                  output_path, output_name, thumbnail_path, thumbnail_name, \
                  duration_sec, frame_count, status_id, job_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                     $15, $16, $17, $18, $19, $20, $21, $22) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(input.project_id)
            .bind(input.order_index)
            .bind(&input.prompt)
            .bind(&input.negative_prompt)
            .bind(input.steps)
            .bind(input.cfg_scale)
            .bind(input.seed)
            .bind(&input.reference_image)
            .bind(input.adapter_weight)
            .bind(&input.model_id)
            .bind(&input.mode)
            .bind(output.width)
            .bind(output.height)
            .bind(output.fps)
            .bind(&output.output_path)
            .bind(&output.output_name)
            .bind(&output.thumbnail_path)
            .bind(&output.thumbnail_name)
            .bind(output.duration_sec)
            .bind(output.frame_count)
            .bind(ClipStatus::Completed.id())
            .bind(job_id)
            .fetch_one(pool)
            .await
    }

    /// Find a clip by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clips WHERE id = $1");
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Load clips in the order their ids were given. Missing ids are skipped.
    pub async fn list_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Clip>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM clips \
             JOIN UNNEST($1::BIGINT[]) WITH ORDINALITY AS requested(clip_id, position) \
               ON clips.id = requested.clip_id \
             ORDER BY requested.position"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Next free order index in `[floor, ceiling)` for a project.
    ///
    /// Ordinary clips use `[0, LONG_VIDEO_ORDER_BASE)`; long-video segments
    /// use the range above it.
    pub async fn next_order_index(
        pool: &PgPool,
        project_id: DbId,
        floor: i32,
        ceiling: i32,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(order_index) + 1, $2) FROM clips \
             WHERE project_id = $1 AND order_index >= $2 AND order_index < $3",
        )
        .bind(project_id)
        .bind(floor)
        .bind(ceiling)
        .fetch_one(pool)
        .await
    }

    /// Move a clip from `from` to `to`.
    ///
    /// Returns `false` without touching the row if the move is not a
    /// forward transition or the clip is no longer in `from`.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: ClipStatus,
        to: ClipStatus,
    ) -> Result<bool, sqlx::Error> {
        if !from.can_transition_to(to) {
            tracing::warn!(clip_id = id, from = from.as_str(), to = to.as_str(), "Rejected clip status transition");
            return Ok(false);
        }
        let result = sqlx::query("UPDATE clips SET status_id = $3 WHERE id = $1 AND status_id = $2")
            .bind(id)
            .bind(from.id())
            .bind(to.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write output and derived metadata and mark a processing clip completed.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        output: &ClipOutput,
    ) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!(
            "UPDATE clips SET \
                 output_path = $3, output_name = $4, \
                 thumbnail_path = $5, thumbnail_name = $6, \
                 duration_sec = $7, frame_count = $8, \
                 width = $9, height = $10, fps = $11, \
                 status_id = $12 \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .bind(ClipStatus::Processing.id())
            .bind(&output.output_path)
            .bind(&output.output_name)
            .bind(&output.thumbnail_path)
            .bind(&output.thumbnail_name)
            .bind(output.duration_sec)
            .bind(output.frame_count)
            .bind(output.width)
            .bind(output.height)
            .bind(output.fps)
            .bind(ClipStatus::Completed.id())
            .fetch_optional(pool)
            .await
    }

    /// Record the job that will produce a clip created before its job existed.
    pub async fn attach_job(pool: &PgPool, id: DbId, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE clips SET job_id = $2 WHERE id = $1")
            .bind(id)
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every clip among `ids` that has not finished yet.
    ///
    /// Completed clips are left untouched. Returns the number of rows changed.
    pub async fn fail_unfinished(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE clips SET status_id = $2 \
             WHERE id = ANY($1) AND status_id IN ($3, $4)",
        )
        .bind(ids)
        .bind(ClipStatus::Failed.id())
        .bind(ClipStatus::Pending.id())
        .bind(ClipStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a clip row, returning it so the caller can remove its files.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!("DELETE FROM clips WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
