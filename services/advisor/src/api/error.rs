use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::approval::ApprovalError;
use crate::loader::LoadError;

/// Error body. `success` is always false so dashboard code can treat every
/// response the same way.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                message: message.into(),
                code: code.into(),
            },
        }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        let message = err.to_string();
        match err {
            ApprovalError::BusNotFound { .. } => Self::not_found("bus_not_found", message),
            ApprovalError::ActionNotFound(_) => Self::not_found("action_not_found", message),
            ApprovalError::NoPendingAction { .. } => {
                Self::not_found("no_pending_action", message)
            }
            ApprovalError::AlreadyResolved { .. } => {
                Self::conflict("action_already_resolved", message)
            }
            ApprovalError::NoSnapshot => Self::service_unavailable("fleet_not_loaded", message),
            ApprovalError::Prompt(_) => Self::internal("approval_failed", message),
        }
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        Self::internal("fleet_load_failed", err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalid_request", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::BusRole;
    use rebal_fleet::BusId;

    #[test]
    fn test_bus_not_found_message() {
        let err = ApiError::from(ApprovalError::BusNotFound {
            role: BusRole::Nearby,
            id: BusId::from(12),
        });
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.message, "Nearby bus with ID 12 not found.");
        assert!(!err.body.success);
    }

    #[test]
    fn test_no_snapshot_is_unavailable() {
        let err = ApiError::from(ApprovalError::NoSnapshot);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body.code, "fleet_not_loaded");
    }
}
