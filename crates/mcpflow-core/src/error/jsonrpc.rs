//! The wire form of an error, and the sanitizing conversion into it.

use super::codes;
use super::types::McpError;
use serde::{Deserialize, Serialize};

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Create an error with no data payload.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a data payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// A "parse error" (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    /// An "invalid request" error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    /// A "method not found" error (-32601).
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, message)
    }

    /// An "invalid params" error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// An "internal error" (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for JsonRpcError {}

/// Sanitizing conversion to the wire form.
///
/// `Internal` and `Timeout` deliberately lose their detail here: the client
/// sees a generic message, the full story goes to the server log at the
/// point the error was produced.
impl From<&McpError> for JsonRpcError {
    fn from(err: &McpError) -> Self {
        let code = err.code();
        match err {
            McpError::Internal { .. } => Self::new(code, "Internal error"),
            McpError::Timeout { .. } => Self::new(code, "Internal error: request timed out"),
            McpError::UrlElicitationRequired {
                url,
                description,
                mime_type,
            } => Self::new(code, err.to_string()).with_data(serde_json::json!({
                "url": url,
                "description": description,
                "mimeType": mime_type,
            })),
            McpError::RateLimited { retry_after } => {
                let mut wire = Self::new(code, err.to_string());
                if let Some(wait) = retry_after {
                    wire = wire.with_data(serde_json::json!({
                        "retryAfterMs": wait.as_millis() as u64,
                    }));
                }
                wire
            }
            _ => Self::new(code, err.to_string()),
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_detail_never_reaches_the_wire() {
        let err = McpError::internal_with("secret connection string", std::io::Error::other("x"));
        let wire: JsonRpcError = (&err).into();
        assert_eq!(wire.code, -32603);
        assert_eq!(wire.message, "Internal error");
        assert!(wire.data.is_none());
    }

    #[test]
    fn url_elicitation_carries_structured_data() {
        let err = McpError::UrlElicitationRequired {
            url: "https://example.com/grant".into(),
            description: Some("grant access".into()),
            mime_type: Some("text/html".into()),
        };
        let wire: JsonRpcError = (&err).into();
        assert_eq!(wire.code, -32042);
        let data = wire.data.unwrap();
        assert_eq!(data["url"], "https://example.com/grant");
        assert_eq!(data["mimeType"], "text/html");
    }

    #[test]
    fn rate_limit_reports_retry_hint() {
        let err = McpError::RateLimited {
            retry_after: Some(std::time::Duration::from_millis(250)),
        };
        let wire: JsonRpcError = (&err).into();
        assert_eq!(wire.code, -32005);
        assert_eq!(wire.data.unwrap()["retryAfterMs"], 250);
    }
}
