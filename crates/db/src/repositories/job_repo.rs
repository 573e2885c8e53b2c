//! Repository for the `jobs` table.
//!
//! The table doubles as the durable queue: workers claim the oldest
//! pending job of their type with `FOR UPDATE SKIP LOCKED`.  Every write a
//! worker makes after claiming is guarded on `status_id = processing`, so
//! an external cancel is never overwritten.

use sqlx::PgPool;
use reelforge_core::job_type::JobType;
use reelforge_core::types::DbId;

use crate::models::job::{Job, JobOutput, SubmitJob};
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, project_id, job_type, status_id, progress_percent, progress_message, \
    settings, clip_ids, result, output_path, output_file_name, error_message, \
    started_at, completed_at, created_at, updated_at";

/// Error message written to jobs found mid-run at worker start-up.
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by worker restart";

/// Provides queue and lifecycle operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job. Returns immediately with the job row.
    pub async fn submit(pool: &PgPool, input: &SubmitJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (project_id, job_type, status_id, settings, clip_ids) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.project_id)
            .bind(input.job_type.as_str())
            .bind(JobStatus::Pending.id())
            .bind(&input.settings)
            .bind(&input.clip_ids)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest pending job of `job_type`.
    ///
    /// The claimed job is moved to `processing` with `started_at` set in
    /// the same statement.
    pub async fn claim_next(pool: &PgPool, job_type: JobType) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE job_type = $1 AND status_id = $3 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_type.as_str())
            .bind(JobStatus::Processing.id())
            .bind(JobStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current status id of a job, `None` if it no longer exists.
    pub async fn status_of(pool: &PgPool, id: DbId) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT status_id FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Raise a processing job's progress.
    ///
    /// The stored percent never decreases and never reaches 100 here;
    /// 100 is written only by [`JobRepo::complete`].
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET progress_percent = GREATEST(progress_percent, LEAST($3, 99)), \
                 progress_message = COALESCE($4, progress_message) \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .bind(percent)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Shallow-merge keys into the job's settings payload.
    pub async fn merge_settings(
        pool: &PgPool,
        job_id: DbId,
        patch: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET settings = settings || $2 WHERE id = $1")
            .bind(job_id)
            .bind(patch)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record a clip produced by the job (long-video segments).
    pub async fn append_clip_id(
        pool: &PgPool,
        job_id: DbId,
        clip_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET clip_ids = array_append(clip_ids, $2) WHERE id = $1")
            .bind(job_id)
            .bind(clip_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a processing job completed with its output.
    ///
    /// Returns `false` if the job was cancelled (or otherwise left
    /// `processing`) before completion was recorded.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        output: &JobOutput,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, progress_percent = 100, \
                 output_path = $4, output_file_name = $5, result = $6, \
                 completed_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::Completed.id())
        .bind(&output.output_path)
        .bind(&output.output_file_name)
        .bind(&output.result)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a pending or processing job failed.
    ///
    /// No automatic retry is performed; the caller must submit a new job.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Returns the status the job was cancelled from, or `None` when it
    /// was already terminal or does not exist. The check and the update
    /// happen in one statement, so the returned status is the one that
    /// was actually replaced. A pending job will never be claimed
    /// afterwards; a processing job keeps running until its worker next
    /// checks the status.
    pub async fn cancel(pool: &PgPool, job_id: DbId) -> Result<Option<JobStatus>, sqlx::Error> {
        let previous = sqlx::query_scalar::<_, StatusId>(
            "WITH prior AS ( \
                 SELECT id, status_id FROM jobs \
                 WHERE id = $1 AND status_id IN ($3, $4) \
                 FOR UPDATE \
             ) \
             UPDATE jobs \
             SET status_id = $2, completed_at = NOW() \
             FROM prior \
             WHERE jobs.id = prior.id \
             RETURNING prior.status_id",
        )
        .bind(job_id)
        .bind(JobStatus::Cancelled.id())
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Processing.id())
        .fetch_optional(pool)
        .await?;
        Ok(previous.and_then(JobStatus::from_id))
    }

    /// Ids of pending jobs of a type, oldest first.
    pub async fn list_pending_ids(
        pool: &PgPool,
        job_type: JobType,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM jobs WHERE job_type = $1 AND status_id = $2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(job_type.as_str())
        .bind(JobStatus::Pending.id())
        .fetch_all(pool)
        .await
    }

    /// Fail every job of `job_type` left `processing` by a previous worker process.
    pub async fn fail_interrupted(pool: &PgPool, job_type: JobType) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE jobs \
             SET status_id = $3, error_message = $4, completed_at = NOW() \
             WHERE job_type = $1 AND status_id = $2 \
             RETURNING id",
        )
        .bind(job_type.as_str())
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::Failed.id())
        .bind(INTERRUPTED_MESSAGE)
        .fetch_all(pool)
        .await
    }
}
