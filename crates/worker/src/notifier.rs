//! Enqueue wake-ups shared between the API and the queue workers.

use std::collections::HashMap;
use std::sync::Arc;

use reelforge_core::job_type::JobType;
use tokio::sync::Notify;

/// One [`Notify`] per job type.
///
/// Enqueueing calls [`notify`](Self::notify) after the job row is
/// committed; the queue worker of that type wakes and claims it. A
/// notification sent while the worker is busy is kept as a permit, so no
/// wake-up is lost.
#[derive(Clone)]
pub struct JobNotifier {
    queues: Arc<HashMap<JobType, Arc<Notify>>>,
}

impl Default for JobNotifier {
    fn default() -> Self {
        let queues = JobType::ALL
            .into_iter()
            .map(|t| (t, Arc::new(Notify::new())))
            .collect();
        Self {
            queues: Arc::new(queues),
        }
    }
}

impl JobNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, job_type: JobType) {
        if let Some(notify) = self.queues.get(&job_type) {
            notify.notify_one();
        }
    }

    /// Wake-up handle for one queue.
    pub fn waiter(&self, job_type: JobType) -> Arc<Notify> {
        self.queues
            .get(&job_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(Notify::new()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn notification_before_wait_is_not_lost() {
        let notifier = JobNotifier::new();
        notifier.notify(JobType::Merge);
        let waiter = notifier.waiter(JobType::Merge);
        tokio::time::timeout(Duration::from_millis(100), waiter.notified())
            .await
            .expect("stored permit wakes the waiter");
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let notifier = JobNotifier::new();
        notifier.notify(JobType::Export);
        let waiter = notifier.waiter(JobType::Generate);
        let woke = tokio::time::timeout(Duration::from_millis(50), waiter.notified()).await;
        assert!(woke.is_err());
    }
}
