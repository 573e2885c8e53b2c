//! Domain model structs and DTOs.
//!
//! Each submodule holds a `FromRow` + `Serialize` entity matching the
//! database row and the insert DTOs for it.

pub mod clip;
pub mod job;
pub mod job_log;
pub mod project;
pub mod status;
