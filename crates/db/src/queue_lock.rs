//! Cross-process ownership of a job-type queue.
//!
//! Row locks keep two workers from claiming the same job, but only a
//! queue-wide lock keeps two processes from running jobs of one type at
//! the same time. The lock is a session-level advisory lock held on a
//! connection detached from the pool, so it lives exactly as long as
//! that connection: a crashed owner releases it when its session ends.

use sqlx::{Connection, PgConnection, PgPool};

use reelforge_core::job_type::JobType;

/// Advisory-lock class shared by all queue locks.
const QUEUE_LOCK_CLASS: i32 = 0x5246_5155;

fn lock_key(job_type: JobType) -> i32 {
    match job_type {
        JobType::Generate => 1,
        JobType::Merge => 2,
        JobType::Upscale => 3,
        JobType::Interpolate => 4,
        JobType::Export => 5,
        JobType::LongVideo => 6,
    }
}

/// Exclusive right to serve one job-type queue.
pub struct QueueLock {
    conn: PgConnection,
    job_type: JobType,
}

impl QueueLock {
    /// Take the queue's lock without waiting. `None` means another
    /// session already owns the queue.
    pub async fn try_acquire(pool: &PgPool, job_type: JobType) -> Result<Option<Self>, sqlx::Error> {
        let mut conn = pool.acquire().await?.detach();
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
            .bind(QUEUE_LOCK_CLASS)
            .bind(lock_key(job_type))
            .fetch_one(&mut conn)
            .await?;
        if !locked {
            conn.close().await?;
            return Ok(None);
        }
        tracing::debug!(job_type = %job_type, "Queue lock acquired");
        Ok(Some(Self { conn, job_type }))
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Unlock and close the dedicated connection.
    pub async fn release(self) -> Result<(), sqlx::Error> {
        let Self { mut conn, job_type } = self;
        sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1, $2)")
            .bind(QUEUE_LOCK_CLASS)
            .bind(lock_key(job_type))
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        tracing::debug!(job_type = %job_type, "Queue lock released");
        Ok(())
    }
}
