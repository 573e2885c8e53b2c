//! Inference client for the ComfyUI node-graph service.
//!
//! - [`workflow`]: pure graph builder and the fixed node templates per
//!   model variant.
//! - [`api`] / [`client`]: REST and WebSocket transports.
//! - [`messages`]: typed WebSocket message parser.
//! - [`service`]: the [`InferenceService`](service::InferenceService) seam
//!   workers depend on, and its ComfyUI implementation.

pub mod api;
pub mod client;
pub mod events;
pub mod messages;
pub mod outputs;
pub mod service;
pub mod workflow;

pub use events::InferenceEvent;
pub use outputs::{ArtifactRef, ExecutionOutputs};
pub use service::{ComfyUIService, ExecutionHandle, InferenceError, InferenceService};
pub use workflow::{build, build_still_image, Graph};
