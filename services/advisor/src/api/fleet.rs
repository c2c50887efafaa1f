//! Read-only fleet views for the dashboard.
//!
//! These serve the snapshot the last pass ran against; `POST /api/passes`
//! reloads it.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use rebal_fleet::{Bus, BusId, FleetSnapshot};
use serde::Serialize;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BusLocation {
    pub id: BusId,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapsKeyResponse {
    pub api_key: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bus-locations", get(bus_locations))
        .route("/bus-details", get(bus_details))
        .route("/google-maps-key", get(google_maps_key))
}

fn current_snapshot(state: &AppState) -> Result<Arc<FleetSnapshot>, ApiError> {
    state.advisor().snapshot().ok_or_else(|| {
        ApiError::service_unavailable("fleet_not_loaded", "no fleet snapshot has been loaded yet")
    })
}

async fn bus_locations(State(state): State<AppState>) -> Result<Json<Vec<BusLocation>>, ApiError> {
    let snapshot = current_snapshot(&state)?;
    let locations = snapshot
        .buses()
        .iter()
        .map(|bus| BusLocation {
            id: bus.id.clone(),
            latitude: bus.position.latitude,
            longitude: bus.position.longitude,
        })
        .collect();
    Ok(Json(locations))
}

async fn bus_details(State(state): State<AppState>) -> Result<Json<Vec<Bus>>, ApiError> {
    let snapshot = current_snapshot(&state)?;
    Ok(Json(snapshot.buses().to_vec()))
}

async fn google_maps_key(State(state): State<AppState>) -> Json<MapsKeyResponse> {
    Json(MapsKeyResponse {
        api_key: state.maps_api_key().map(str::to_string),
    })
}
