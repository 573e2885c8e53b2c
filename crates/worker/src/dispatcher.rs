//! The serial worker behind one job-type queue.
//!
//! Claims the oldest pending job of its type with
//! `SELECT ... FOR UPDATE SKIP LOCKED` (see [`JobRepo::claim_next`]) and
//! runs it to completion before claiming the next. A worker only claims
//! while it holds its queue's [`QueueLock`], so at most one job of a type
//! is in flight across every process sharing the database. A worker
//! without the lock retries on each wake-up and takes the queue over once
//! the owning process goes away.

use std::sync::Arc;
use std::time::Duration;

use reelforge_core::job_type::JobType;
use reelforge_db::repositories::JobRepo;
use reelforge_db::{DbPool, QueueLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::runner::JobRunner;

pub struct QueueWorker {
    job_type: JobType,
    pool: DbPool,
    runner: JobRunner,
    wake: Arc<Notify>,
    poll_interval: Duration,
    lock: Option<QueueLock>,
}

impl QueueWorker {
    pub fn new(
        job_type: JobType,
        pool: DbPool,
        runner: JobRunner,
        wake: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            job_type,
            pool,
            runner,
            wake,
            poll_interval,
            lock: None,
        }
    }

    /// Start with the queue's lock already held.
    pub fn with_lock(mut self, lock: QueueLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn owns_queue(&self) -> bool {
        self.lock.is_some()
    }

    /// Run the queue loop until the cancellation token is triggered.
    ///
    /// A job already running when shutdown is requested is finished first;
    /// nothing new is claimed afterwards and the queue lock is released.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            job_type = %self.job_type,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            owns_queue = self.owns_queue(),
            "Queue worker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job_type = %self.job_type, "Queue worker shutting down");
                    break;
                }
                _ = self.wake.notified() => {}
                _ = ticker.tick() => {}
            }
            if !self.owns_queue() && !self.take_over().await {
                continue;
            }
            self.drain(&cancel).await;
        }

        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release().await {
                tracing::warn!(job_type = %self.job_type, error = %e, "Failed to release queue lock");
            }
        }
    }

    /// Try to become the queue's owner. A new owner first fails whatever
    /// the previous owner left `processing`.
    async fn take_over(&mut self) -> bool {
        match QueueLock::try_acquire(&self.pool, self.job_type).await {
            Ok(Some(lock)) => {
                if let Err(e) = self.runner.recover_interrupted(self.job_type).await {
                    tracing::error!(job_type = %self.job_type, error = %e, "Failed to recover interrupted jobs");
                }
                tracing::info!(job_type = %self.job_type, "Took over queue");
                self.lock = Some(lock);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(job_type = %self.job_type, error = %e, "Queue lock check failed");
                false
            }
        }
    }

    /// Claim and run jobs until the queue is empty or shutdown starts.
    /// Returns how many jobs ran.
    pub async fn drain(&self, cancel: &CancellationToken) -> usize {
        let mut ran = 0;
        while !cancel.is_cancelled() {
            match JobRepo::claim_next(&self.pool, self.job_type).await {
                Ok(Some(job)) => {
                    tracing::info!(job_id = job.id, job_type = %self.job_type, "Job claimed");
                    self.runner.execute(job, self.job_type).await;
                    ran += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(job_type = %self.job_type, error = %e, "Claim cycle failed");
                    break;
                }
            }
        }
        ran
    }
}
