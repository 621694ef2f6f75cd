use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::RpcError;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No caller identity on the request.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Request rejected before anything was sent to the backend.
    #[error("{0}")]
    Validation(String),

    /// The backend reported that the requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The backend reported that the operation failed.
    #[error("{message}")]
    BackendFailure { status: StatusCode, message: String },

    /// The call never produced a usable reply.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        // ---
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BackendFailure { status, .. } => *status,
            ApiError::Rpc(RpcError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Rpc(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
