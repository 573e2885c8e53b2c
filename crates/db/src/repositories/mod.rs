//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod clip_repo;
pub mod job_log_repo;
pub mod job_repo;
pub mod project_repo;

pub use clip_repo::ClipRepo;
pub use job_log_repo::JobLogRepo;
pub use job_repo::JobRepo;
pub use project_repo::ProjectRepo;
