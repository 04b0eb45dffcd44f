//! V1 API route tree.

mod instances;
mod nodes;
mod summary;

use axum::Router;

use crate::state::AppState;

/// Assemble all v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/instances", instances::routes())
        .nest("/nodes", nodes::routes())
        .nest("/summary", summary::routes())
}
