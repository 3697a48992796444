//! Request handlers.

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vizor_core::{ConfigurationBuilder, VizorError};

type ApiResponse = (StatusCode, Json<Value>);

fn failure(status: StatusCode, reason: impl Into<String>) -> ApiResponse {
    (status, Json(json!({ "reason": reason.into() })))
}

fn from_error(err: &VizorError) -> ApiResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    failure(status, err.reason())
}

/// Health check: healthy when the built-in backend can be loaded.
pub async fn handle_ping(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Ping received...");

    match state.model.registry().register(None, &state.ping_config).await {
        Ok(_) => (StatusCode::OK, Json(json!({}))),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::NOT_FOUND, Json(json!({})))
        }
    }
}

/// Run inference for a JSON body holding a configuration plus `source`.
pub async fn handle_invocations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !is_json(&headers) {
        return failure(StatusCode::BAD_REQUEST, "Request is not application/json");
    }

    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)),
    };

    // Requests are always served locally, never delegated again.
    let config = match ConfigurationBuilder::from_json(&request) {
        Ok(builder) => builder.endpoint(None::<String>).build(),
        Err(e) => return from_error(&e),
    };

    let source = request.get("source").unwrap_or(&Value::Null);
    match state.model.infer_value(source, &config).await {
        Ok(predictions) => {
            debug!("Inference result {:?}", predictions);
            match serde_json::to_value(&predictions) {
                Ok(value) => (StatusCode::OK, Json(value)),
                Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        Err(e) => {
            error!("Inference failed: {}", e);
            from_error(&e)
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
