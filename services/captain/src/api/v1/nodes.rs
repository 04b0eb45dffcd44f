//! Node API endpoints.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Create node routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_nodes))
        .route("/{node_id}", get(get_node))
}

/// Every pool member with its slot usage. Unreachable nodes are reported as
/// degraded rather than dropped, so the handler itself cannot fail.
async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator().get_nodes().await)
}

/// One node's descriptor, or 404 when the id is not in the pool.
async fn get_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = state
        .orchestrator()
        .get_node(&node_id)
        .await
        .map_err(|error| ApiError::from(error).with_request_id(ctx.request_id))?;
    Ok(Json(descriptor))
}
