use axum::routing::get;
use axum::Router;

use crate::handlers::resolution;
use crate::state::AppState;

/// Routes mounted at `/resolution`.
///
/// ```text
/// GET    /preview         -> preview
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/preview", get(resolution::preview))
}
