//! Progress event type constants and channel naming.
//!
//! Used by the progress bus, the SSE relay, and the workers when
//! publishing job lifecycle updates.

use crate::types::DbId;

/// First frame sent on every progress stream.
pub const EVENT_CONNECTED: &str = "connected";

/// Progress update during job execution.
pub const EVENT_PROGRESS: &str = "progress";

/// Job completed successfully (terminal).
pub const EVENT_COMPLETED: &str = "completed";

/// Job failed or was cancelled (terminal).
pub const EVENT_ERROR: &str = "error";

/// Delay between observing a terminal event and closing the stream.
pub const STREAM_CLOSE_DELAY_MS: u64 = 100;

/// Job log levels.
pub const LOG_INFO: &str = "info";
pub const LOG_WARN: &str = "warn";
pub const LOG_ERROR: &str = "error";

/// Broadcast topic carrying a job's progress events.
pub fn progress_channel(job_id: DbId) -> String {
    format!("job:{job_id}:progress")
}

/// Whether an event type ends a progress stream.
pub fn is_terminal(event_type: &str) -> bool {
    event_type == EVENT_COMPLETED || event_type == EVENT_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_keyed_by_job() {
        assert_eq!(progress_channel(42), "job:42:progress");
    }

    #[test]
    fn only_completed_and_error_are_terminal() {
        assert!(is_terminal(EVENT_COMPLETED));
        assert!(is_terminal(EVENT_ERROR));
        assert!(!is_terminal(EVENT_PROGRESS));
        assert!(!is_terminal(EVENT_CONNECTED));
    }
}
