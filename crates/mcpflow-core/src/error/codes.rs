//! JSON-RPC and application error codes.

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;

/// The payload is not a valid Request object.
pub const INVALID_REQUEST: i32 = -32600;

/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;

/// Internal server error.
pub const INTERNAL_ERROR: i32 = -32603;

// Application codes, inside the JSON-RPC server-error range.

/// A requested resource was not found.
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// The session's token bucket is empty. Non-fatal; retry later.
pub const RATE_LIMITED: i32 = -32005;

/// A tool requires the client to visit a URL before the call can succeed.
/// `error.data` carries `{url, description?, mimeType?}`.
pub const URL_ELICITATION_REQUIRED: i32 = -32042;

/// The request was cancelled before it produced a result.
pub const REQUEST_CANCELLED: i32 = -32800;
