use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Match level too low for the requested message/call type. Permanent
    /// until the level advances; callers must not retry the same request.
    #[error("capability denied: requires level {required}, match is at level {level}")]
    CapabilityDenied { required: i32, level: i32 },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    /// Concurrent state violation (second active call, lost CAS race).
    /// The higher-level operation may be retried; the same request may not.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Realtime publish or push delivery failure. Logged and swallowed on
    /// the write path; the committed write is never rolled back.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or out-of-order session description / candidate.
    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Returns whether this error is retryable (e.g. pool exhaustion).
    /// CapabilityDenied is explicitly permanent: retrying without a level
    /// change yields the same rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            AppError::Conflict(_) | AppError::Transport(_) => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::CapabilityDenied { .. } | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Signaling(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        // Internal details stay in the logs
        let message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let mut body = serde_json::json!({ "error": message });
        if let AppError::CapabilityDenied { required, level } = &self {
            body["required_level"] = serde_json::json!(required);
            body["current_level"] = serde_json::json!(level);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_denied_is_permanent() {
        let err = AppError::CapabilityDenied {
            required: 3,
            level: 1,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn conflict_is_retryable_at_operation_level() {
        assert!(AppError::Conflict("call in progress".into()).is_retryable());
        assert_eq!(
            AppError::Conflict("call in progress".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(
            AppError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Signaling("stale".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Transport("publish".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
