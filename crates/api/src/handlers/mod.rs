pub mod clips;
pub mod enqueue;
pub mod jobs;
pub mod progress;
pub mod projects;
pub mod resolution;
