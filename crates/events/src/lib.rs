//! Job progress fan-out.
//!
//! - [`ProgressBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, subscribable per job.
//! - [`ProgressEvent`]: the structured event carried on the bus and
//!   relayed verbatim to stream clients.
//! - [`ProgressReporter`]: per-job producer handed to workers; enforces
//!   monotonic percent and the "100 only on completion" rule.
//! - [`ProgressPersistence`]: consumer that mirrors progress into the
//!   job store.

pub mod bus;
pub mod persistence;
pub mod reporter;

pub use bus::{JobSubscription, ProgressBus, ProgressEvent, ProgressEventKind};
pub use persistence::ProgressPersistence;
pub use reporter::ProgressReporter;
