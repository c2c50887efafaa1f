//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buses: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_actions: Option<usize>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "advisor".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        buses: None,
        pending_actions: None,
    })
}

/// Ready once a fleet snapshot has been loaded.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let buses = state.advisor().snapshot().map(|s| s.len());
    let response = HealthResponse {
        status: if buses.is_some() { "ok" } else { "degraded" }.to_string(),
        service: "advisor".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        buses,
        pending_actions: Some(state.gate().pending().len()),
    };

    if buses.is_some() {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
