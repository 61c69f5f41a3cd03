//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, StatusCode};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::warn;

use crate::web::AppState;

/// GET /metrics: the whole surface in text exposition format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let mut body = String::new();
    match encoder.encode_utf8(&state.registry.gather(), &mut body) {
        Ok(()) => {
            let content_type = encoder.format_type().to_string();
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            warn!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /health: receiver location and the age of the last passes.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let windows: Vec<String> = state.engine.windows().iter().map(|w| w.label()).collect();
    Json(json!({
        "status": "ok",
        "reference": state.engine.reference(),
        "last_aircraft_pass": state.status.aircraft(),
        "last_stats_pass": state.status.stats(),
        "windows": windows,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
