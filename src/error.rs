use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Application-wide error type. Every component layer returns one of
/// these; the HTTP layer is the only place that knows about status
/// codes, mapping each variant at the boundary.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("room full")]
    RoomFull,

    #[error("capacity exceeded")]
    CapacityExceeded,

    #[error("operation timed out")]
    Timeout,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            HubError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            HubError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            HubError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            HubError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            HubError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            HubError::RoomFull => (StatusCode::CONFLICT, self.to_string()),
            HubError::CapacityExceeded => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            HubError::Timeout => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            HubError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
            HubError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type HubResult<T> = Result<T, HubError>;
