use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("no available drivers found")]
    NoCandidates,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::NotFound(_) => "NOT_FOUND",
            DispatchError::InvalidState(_) => "INVALID_STATE",
            DispatchError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            DispatchError::DriverUnavailable(_) => "DRIVER_UNAVAILABLE",
            DispatchError::NoCandidates => "NO_CANDIDATES",
            DispatchError::Validation(_) => "VALIDATION_ERROR",
            DispatchError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::InvalidState(_)
            | DispatchError::IllegalTransition(_)
            | DispatchError::DriverUnavailable(_) => StatusCode::CONFLICT,
            DispatchError::NoCandidates => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
