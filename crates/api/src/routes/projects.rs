use axum::routing::{get, post};
use axum::Router;

use crate::handlers::projects;
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// POST   /                -> create_project
/// GET    /{id}            -> get_project
/// DELETE /{id}            -> delete_project
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(projects::create_project))
        .route(
            "/{id}",
            get(projects::get_project).delete(projects::delete_project),
        )
}
