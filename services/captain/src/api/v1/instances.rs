//! Instance API endpoints.
//!
//! Each handler is a thin pass-through to one orchestrator operation; the
//! interesting behavior lives there, not here.

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::api::error::{ApiError, FieldError};
use crate::api::request_context::RequestContext;
use crate::error::CaptainError;
use crate::orchestrator::{InstanceLogs, LaunchRequest};
use crate::state::AppState;

/// Longest accepted application name.
const MAX_APP_NAME_LEN: usize = 63;

/// Create instance routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_instances).post(create_instance))
        .route("/{instance_id}", get(get_instance).delete(delete_instance))
        .route("/{instance_id}/logs", get(get_instance_logs))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to place a new instance.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInstanceRequest {
    /// Application name; becomes the container name prefix.
    pub app: String,

    /// Location of the source bundle the runner fetches at boot.
    pub source_uri: String,

    /// Target node id.
    pub node: String,

    /// Extra environment for the instance.
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Slot cost; the configured default applies when omitted.
    #[serde(default)]
    pub slots: Option<u32>,

    /// Container hostname override.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Runner image tag override for this launch.
    #[serde(default)]
    pub version: Option<String>,
}

/// Query parameters for the logs endpoint.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Keep the connection open and stream new lines as they appear.
    #[serde(default)]
    pub follow: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// List every live instance on the fleet.
async fn list_instances(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let instances = state
        .orchestrator()
        .list_instances(None)
        .await
        .map_err(|error| into_api_error(error, &ctx.request_id))?;
    Ok(Json(instances))
}

/// Place and start a new instance, returning it with its assigned port.
async fn create_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<CreateInstanceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;

    let Json(request) = body.map_err(|rejection| {
        ApiError::bad_request("invalid_body", rejection.body_text())
            .with_request_id(request_id.clone())
    })?;

    validate_app_name(&request.app, &request_id)?;
    validate_required(&request.source_uri, "source_uri", &request_id)?;
    validate_required(&request.node, "node", &request_id)?;

    let instance = state
        .orchestrator()
        .start_instance(LaunchRequest {
            app: request.app,
            source_uri: request.source_uri,
            node: request.node,
            environment: request.environment,
            slots: request.slots,
            hostname: request.hostname,
            runner_version: request.version,
        })
        .await
        .map_err(|error| into_api_error(error, &request_id))?;

    Ok((StatusCode::CREATED, Json(instance)))
}

/// One instance by id, from whichever node holds it.
async fn get_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let instances = state
        .orchestrator()
        .list_instances(None)
        .await
        .map_err(|error| into_api_error(error, &ctx.request_id))?;

    let Some(instance) = instances
        .into_iter()
        .find(|instance| instance.id == instance_id)
    else {
        return Err(ApiError::not_found(
            "instance_not_found",
            format!("no such instance: {instance_id}"),
        )
        .with_request_id(ctx.request_id));
    };

    Ok(Json(instance))
}

/// Stop an instance. 204 when it was stopped, 404 when nothing carries the
/// id, so deleting twice is safe for automation to retry.
async fn delete_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stopped = state
        .orchestrator()
        .stop_instance(&instance_id)
        .await
        .map_err(|error| into_api_error(error, &ctx.request_id))?;

    if stopped {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(
            "instance_not_found",
            format!("no such instance: {instance_id}"),
        )
        .with_request_id(ctx.request_id))
    }
}

/// Stream an instance's log lines as newline-delimited JSON.
async fn get_instance_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(instance_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let logs = state
        .orchestrator()
        .get_logs(&instance_id, query.follow)
        .await
        .map_err(|error| into_api_error(error, &ctx.request_id))?;

    let response = match logs {
        InstanceLogs::History(lines) => {
            let mut body = String::new();
            for line in &lines {
                body.push_str(&log_line_json(line));
            }
            ndjson_response(Body::from(body))
        }
        InstanceLogs::Follow(lines) => {
            let stream = lines.map(|result| result.map(|line| Bytes::from(log_line_json(&line))));
            ndjson_response(Body::from_stream(stream))
        }
    };
    Ok(response)
}

// =============================================================================
// Helpers
// =============================================================================

fn into_api_error(error: CaptainError, request_id: &str) -> ApiError {
    ApiError::from(error).with_request_id(request_id.to_string())
}

fn log_line_json(line: &str) -> String {
    format!("{}\n", serde_json::json!({ "msg": line }))
}

fn ndjson_response(body: Body) -> Response {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson"),
    );
    response
}

/// App names end up in container names, which key the app off the first
/// underscore, so underscores stay reserved for the platform.
fn validate_app_name(app: &str, request_id: &str) -> Result<(), ApiError> {
    let mut chars = app.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    if !head_ok || !tail_ok || app.len() > MAX_APP_NAME_LEN {
        return Err(ApiError::bad_request(
            "invalid_app_name",
            "app must start with a letter or digit and contain only letters, digits, dots and dashes",
        )
        .with_details(vec![FieldError {
            field: "app".to_string(),
            message: format!("invalid app name: {app:?}"),
        }])
        .with_request_id(request_id.to_string()));
    }
    Ok(())
}

fn validate_required(value: &str, field: &str, request_id: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(
            format!("invalid_{field}"),
            format!("{field} cannot be empty"),
        )
        .with_request_id(request_id.to_string()));
    }
    Ok(())
}
