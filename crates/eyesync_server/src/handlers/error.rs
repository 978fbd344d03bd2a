use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eyesync_core::ReplicaError;
use eyesync_core::error::SerializableError;
use tracing::warn;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by the HTTP handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: SerializableError,
}

impl ApiError {
    pub fn internal(message: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: SerializableError {
                kind: "Internal".to_string(),
                message: message.to_string(),
            },
        }
    }
}

impl From<ReplicaError> for ApiError {
    fn from(err: ReplicaError) -> Self {
        let status = match &err {
            ReplicaError::InvalidKey(_) | ReplicaError::InvalidRoom(_) => StatusCode::BAD_REQUEST,
            ReplicaError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            // Not acknowledged; the client keeps its state dirty and retries.
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status != StatusCode::BAD_REQUEST {
            warn!("Replica request failed: {}", err);
        }
        Self {
            status,
            error: err.to_serializable(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
