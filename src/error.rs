use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::log::StreamKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cursor: {0:?}")]
pub struct CursorParseError(pub String);

/// Failures of the cursor log collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("stream {0} is closed")]
    Closed(StreamKey),
    /// Entries after `requested` were evicted before the reader got to them.
    #[error("stream {key} no longer holds entries after {requested}; oldest retained is {oldest}")]
    Trimmed { key: StreamKey, requested: u64, oldest: u64 },
    #[error("log unavailable: {0}")]
    Unavailable(String),
}

/// Terminal conditions of a streaming loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("peer disconnected")]
    PeerDisconnected,
    #[error("failed to encode entry: {0}")]
    Encode(String),
}

/// A control message that could not be turned into a subscription.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed control message: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Cursor(#[from] CursorParseError),
}

/// Errors surfaced by the HTTP adapters.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("workspace {0} not found")]
    WorkspaceNotFound(String),
    #[error("flow {flow} not found in workspace {workspace}")]
    FlowNotFound { workspace: String, flow: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Log(#[from] LogError),
}

impl From<CursorParseError> for ApiError {
    fn from(err: CursorParseError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::WorkspaceNotFound(_) | ApiError::FlowNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Log(LogError::Closed(_)) => StatusCode::CONFLICT,
            ApiError::Log(LogError::Trimmed { .. }) => StatusCode::GONE,
            ApiError::Log(LogError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
