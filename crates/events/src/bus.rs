//! In-process progress bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`ProgressBus`] is shared via `Arc<ProgressBus>` between the workers
//! (producers) and the stream endpoint and store writer (consumers).

use chrono::{DateTime, Utc};
use reelforge_core::job_events::{
    self, EVENT_COMPLETED, EVENT_CONNECTED, EVENT_ERROR, EVENT_PROGRESS,
};
use reelforge_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// Discriminant of a [`ProgressEvent`], serialized as its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEventKind {
    Connected,
    Progress,
    Completed,
    Error,
}

impl ProgressEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressEventKind::Connected => EVENT_CONNECTED,
            ProgressEventKind::Progress => EVENT_PROGRESS,
            ProgressEventKind::Completed => EVENT_COMPLETED,
            ProgressEventKind::Error => EVENT_ERROR,
        }
    }

    /// Whether the event ends the job's stream.
    pub fn is_terminal(self) -> bool {
        job_events::is_terminal(self.as_str())
    }
}

/// A job progress update.
///
/// Segment and stage are first-class fields so that clients never need to
/// parse message text to know where a job is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    pub job_id: DbId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_segments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventKind, job_id: DbId) -> Self {
        Self {
            kind,
            job_id,
            percent: None,
            message: None,
            stage: None,
            segment: None,
            total_segments: None,
            output_path: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// The first frame of every stream.
    pub fn connected(job_id: DbId) -> Self {
        Self::new(ProgressEventKind::Connected, job_id)
    }
}

// ---------------------------------------------------------------------------
// ProgressBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out of [`ProgressEvent`]s for every job.
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the job store stays authoritative.
    pub fn publish(&self, event: ProgressEvent) {
        tracing::trace!(
            channel = %job_events::progress_channel(event.job_id),
            kind = event.kind.as_str(),
            percent = ?event.percent,
            "Publishing progress event"
        );
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events for every job.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events of a single job.
    pub fn subscribe_job(&self, job_id: DbId) -> JobSubscription {
        JobSubscription {
            job_id,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiver filtered to one job's events.
pub struct JobSubscription {
    job_id: DbId,
    receiver: broadcast::Receiver<ProgressEvent>,
}

impl JobSubscription {
    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    /// Next event for this job, or `None` once the bus is gone.
    ///
    /// Lagging is logged and skipped; the stream is only a low-latency
    /// hint and clients poll the store for the authoritative state.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.job_id == self.job_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(job_id = self.job_id, skipped = n, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
