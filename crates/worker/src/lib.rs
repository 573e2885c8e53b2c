//! One durable queue and one serial worker per job type.
//!
//! The `jobs` table is the queue. Each [`QueueWorker`] holds its queue's
//! cross-process lock, claims the oldest pending job of its type, runs it
//! through a [`JobRunner`] and goes back to sleep until it is notified of
//! new work or its poll interval fires.
//! [`WorkerPool`] owns one worker per type and the shared shutdown token.

pub mod config;
pub mod dispatcher;
pub mod notifier;
pub mod pool;
pub mod runner;

pub use config::WorkerConfig;
pub use dispatcher::QueueWorker;
pub use notifier::JobNotifier;
pub use pool::WorkerPool;
pub use runner::{JobRunner, RunOutcome};
