use axum::{extract::State, routing::post, Json, Router};

use super::error::ApiError;
use crate::advisor::PassReport;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/passes", post(run_pass))
}

/// Reload the fleet, run a pass, and start waiting on whatever it proposed.
async fn run_pass(State(state): State<AppState>) -> Result<Json<PassReport>, ApiError> {
    let report = state.advisor().run_pass().await?;
    state
        .advisor()
        .spawn_follow_ups(state.follow_up().clone(), &report.proposals);
    Ok(Json(report))
}
