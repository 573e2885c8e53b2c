//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Error bodies are
//! produced by [`AppError`](crate::error::AppError) instead.

use serde::Serialize;
use reelforge_core::types::DbId;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body returned by every enqueue endpoint.
///
/// Serialized as `{"jobId": ..}`; generate jobs also carry the id of the
/// pending clip they will fill.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enqueued {
    pub job_id: DbId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<DbId>,
}
