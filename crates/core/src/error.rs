//! Domain errors shared by every crate above `core`.

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Bad or missing parameters, caught before any external call.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The entity is in a state that forbids the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
