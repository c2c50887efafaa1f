//! Proposed action listing and admin decisions.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use rebal_fleet::{ActionKind, BusId};
use rebal_id::ActionId;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use crate::advisor::Decision;
use crate::approval::{ActionRecord, ActionStatus, Verdict};
use crate::notify::DeliveryReport;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pending-actions", get(pending_actions))
        .route("/actions", get(list_actions))
        .route("/actions/{action_id}", get(get_action))
        .route("/actions/{action_id}/decision", post(decide_action))
        .route("/admin-action", post(admin_action))
}

#[derive(Debug, Deserialize)]
pub struct ListActionsQuery {
    pub status: Option<ActionStatus>,
}

/// Decision addressed by bus pair, as sent by the dashboard.
#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub current_bus_id: BusId,
    pub nearby_bus_id: BusId,
    pub action: ActionKind,
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    /// True only for approvals.
    pub success: bool,
    pub message: String,
    pub action_id: ActionId,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryReport>,
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        let approved = decision.record.status == ActionStatus::Approved;
        let message = match (&decision.delivery, approved) {
            (Some(d), true) if d.failed > 0 => format!(
                "Action approved; {} of {} notifications failed.",
                d.failed,
                d.failed + d.delivered
            ),
            (_, true) => "Action approved and notifications sent.".to_string(),
            (_, false) => "Action denied by admin.".to_string(),
        };
        Self {
            success: approved,
            message,
            action_id: decision.record.action_id,
            status: decision.record.status,
            delivery: decision.delivery,
        }
    }
}

fn parse_action_id(raw: &str) -> Result<ActionId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_request("invalid_action_id", format!("{raw}: {e}")))
}

async fn pending_actions(State(state): State<AppState>) -> Json<Vec<ActionRecord>> {
    Json(state.gate().pending())
}

async fn list_actions(
    State(state): State<AppState>,
    Query(query): Query<ListActionsQuery>,
) -> Json<Vec<ActionRecord>> {
    Json(state.gate().list(query.status))
}

async fn get_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<ActionRecord>, ApiError> {
    let id = parse_action_id(&action_id)?;
    state
        .gate()
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("action_not_found", format!("action {id} not found")))
}

async fn decide_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let id = parse_action_id(&action_id)?;
    let Json(request) = payload?;

    let decision = state
        .advisor()
        .decide(id, Verdict::from_approved(request.approved))
        .await?;
    info!(action_id = %id, status = %decision.record.status, "Decision recorded");
    Ok(Json(decision.into()))
}

async fn admin_action(
    State(state): State<AppState>,
    payload: Result<Json<AdminActionRequest>, JsonRejection>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let Json(request) = payload?;

    let decision = state
        .advisor()
        .decide_pair(
            &request.current_bus_id,
            &request.nearby_bus_id,
            request.action,
            Verdict::from_approved(request.approved),
        )
        .await?;
    info!(
        current_bus_id = %request.current_bus_id,
        nearby_bus_id = %request.nearby_bus_id,
        status = %decision.record.status,
        "Decision recorded"
    );
    Ok(Json(decision.into()))
}
