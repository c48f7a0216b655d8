//! The central error enum.

use super::codes;
use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Boxed source error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every failure mode the engine can produce or propagate.
///
/// The variants map onto the seven dispatch-time categories: malformed
/// input, session-state violations, admission rejections, parameter
/// validation, the URL-elicitation control signal, unexpected internal
/// failures, and cancellation.
#[derive(Debug, Error, Diagnostic)]
pub enum McpError {
    /// Invalid JSON was received.
    #[error("Parse error: {message}")]
    #[diagnostic(code(mcpflow::protocol::parse_error))]
    Parse {
        /// What failed to parse.
        message: String,
    },

    /// The payload is not a valid request, or the session state forbids it.
    #[error("Invalid request: {message}")]
    #[diagnostic(code(mcpflow::protocol::invalid_request))]
    InvalidRequest {
        /// Human-readable reason.
        message: String,
    },

    /// The method does not exist.
    #[error("Method not found: {method}")]
    #[diagnostic(code(mcpflow::protocol::method_not_found))]
    MethodNotFound {
        /// The method that was requested.
        method: String,
    },

    /// Invalid method parameters.
    #[error("Invalid params for '{method}': {message}")]
    #[diagnostic(code(mcpflow::protocol::invalid_params))]
    InvalidParams {
        /// The method whose parameters were rejected.
        method: String,
        /// What was wrong with them.
        message: String,
    },

    /// An unexpected internal failure.
    ///
    /// The message and source stay server-side; the wire form is the
    /// generic "Internal error".
    #[error("Internal error: {message}")]
    #[diagnostic(code(mcpflow::internal_error), severity(error))]
    Internal {
        /// Full detail, for logs only.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<BoxError>,
    },

    /// The session exhausted its token bucket.
    #[error("Rate limit exceeded")]
    #[diagnostic(
        code(mcpflow::admission::rate_limited),
        help("Back off and retry; the bucket refills continuously")
    )]
    RateLimited {
        /// Suggested wait before retrying.
        retry_after: Option<Duration>,
    },

    /// A tool requires the client to visit a URL before it can proceed.
    #[error("URL elicitation required: {url}")]
    #[diagnostic(code(mcpflow::tool::url_elicitation))]
    UrlElicitationRequired {
        /// The URL the client must act on.
        url: String,
        /// What the URL is for.
        description: Option<String>,
        /// MIME type of whatever the URL serves.
        mime_type: Option<String>,
    },

    /// A server-initiated request was not answered in time.
    #[error("Timed out after {}ms waiting for the client", waited.as_millis())]
    #[diagnostic(code(mcpflow::bridge::timeout))]
    Timeout {
        /// How long the engine waited.
        waited: Duration,
    },

    /// The request was cancelled.
    #[error("Request cancelled")]
    #[diagnostic(code(mcpflow::cancelled))]
    Cancelled,

    /// A requested resource was not found.
    #[error("Resource not found: {uri}")]
    #[diagnostic(code(mcpflow::resource::not_found))]
    ResourceNotFound {
        /// The URI that missed.
        uri: String,
    },
}

impl McpError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a method-not-found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid-params error.
    pub fn invalid_params(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create an internal error without a source.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error wrapping a source.
    pub fn internal_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The JSON-RPC code this error maps to.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => codes::PARSE_ERROR,
            Self::InvalidRequest { .. } => codes::INVALID_REQUEST,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => codes::INVALID_PARAMS,
            Self::Internal { .. } => codes::INTERNAL_ERROR,
            Self::RateLimited { .. } => codes::RATE_LIMITED,
            Self::UrlElicitationRequired { .. } => codes::URL_ELICITATION_REQUIRED,
            // A bridge timeout that escapes a tool is an internal failure
            // from the client's point of view.
            Self::Timeout { .. } => codes::INTERNAL_ERROR,
            Self::Cancelled => codes::REQUEST_CANCELLED,
            Self::ResourceNotFound { .. } => codes::RESOURCE_NOT_FOUND,
        }
    }

    /// Whether the client did something recoverable (as opposed to the
    /// server failing).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::InvalidRequest { .. }
                | Self::MethodNotFound { .. }
                | Self::InvalidParams { .. }
                | Self::RateLimited { .. }
        )
    }
}
