//! Repository for the append-only `job_logs` table.

use sqlx::PgPool;
use reelforge_core::types::DbId;

use crate::models::job_log::{JobLog, NewJobLog};

const COLUMNS: &str = "id, job_id, level, message, stage, segment, total_segments, created_at";

pub struct JobLogRepo;

impl JobLogRepo {
    /// Append a log line to a job.
    pub async fn append(pool: &PgPool, entry: &NewJobLog) -> Result<JobLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_logs (job_id, level, message, stage, segment, total_segments) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobLog>(&query)
            .bind(entry.job_id)
            .bind(&entry.level)
            .bind(&entry.message)
            .bind(&entry.stage)
            .bind(entry.segment)
            .bind(entry.total_segments)
            .fetch_one(pool)
            .await
    }

    /// All log lines for a job in insertion order.
    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_logs WHERE job_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, JobLog>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
