//! Pure domain logic shared by every reelforge crate.
//!
//! Nothing in here talks to the database, the inference service or the
//! progress bus. The one exception is [`ffmpeg`], which shells out to the
//! media tool but holds no state of its own.

pub mod error;
pub mod ffmpeg;
pub mod generation;
pub mod job_events;
pub mod job_type;
pub mod progress;
pub mod resolution;
pub mod segments;
pub mod types;
