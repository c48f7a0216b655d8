//! HTTP-layer failures and their status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mcpflow_core::error::{JsonRpcError, McpError};
use thiserror::Error;

/// Failures produced by the HTTP layer itself, before or outside the
/// engine's JSON-RPC dispatch.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request body was not valid JSON.
    #[error("invalid body: {0}")]
    InvalidBody(String),
    /// The request needs an `mcp-session-id` header.
    #[error("missing mcp-session-id header")]
    MissingSession,
    /// The named session does not exist.
    #[error("unknown session")]
    UnknownSession,
}

impl TransportError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) | Self::MissingSession => StatusCode::BAD_REQUEST,
            Self::UnknownSession => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let error = match &self {
            Self::InvalidBody(detail) => JsonRpcError::parse_error(format!("invalid JSON: {detail}")),
            Self::MissingSession | Self::UnknownSession => {
                JsonRpcError::invalid_request(self.to_string())
            }
        };
        (self.status(), Json(serde_json::json!({ "error": error }))).into_response()
    }
}

/// Map an engine error from the respond channel onto an HTTP response.
pub(crate) fn respond_error(error: &McpError) -> Response {
    let status = if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(serde_json::json!({ "error": JsonRpcError::from(error) })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_failure_kind() {
        assert_eq!(
            TransportError::InvalidBody("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(TransportError::UnknownSession.status(), StatusCode::NOT_FOUND);
    }
}
