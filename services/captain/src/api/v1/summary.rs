//! Fleet summary endpoint.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(get_summary))
}

/// Instance counts per application across every reachable node.
async fn get_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .orchestrator()
        .get_instance_summary()
        .await
        .map_err(|error| ApiError::from(error).with_request_id(ctx.request_id))?;
    Ok(Json(summary))
}
