//! Job handlers for every queue.
//!
//! - [`handlers`]: generate, merge, upscale, interpolate, the export
//!   pipeline and the long-video segment chain.
//! - [`run`]: the per-job [`JobRun`] handle and the [`JobHandler`] seam
//!   the worker pool drives.
//! - [`PipelineContext`]: the injected store, inference client, media tool
//!   and progress bus shared by all handlers.

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod outputs;
pub mod run;
pub mod scratch;
pub mod settings;

mod inference;

pub use config::{JobTimeouts, PipelineConfig};
pub use context::PipelineContext;
pub use error::PipelineError;
pub use run::{JobHandler, JobRun, Pipeline};
