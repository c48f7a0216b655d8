//! Root types for server-initiated `roots/list` requests.

use serde::{Deserialize, Serialize};

/// A filesystem or URI root the client grants the server access to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Root URI, usually `file://`.
    pub uri: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The client's answer to `roots/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// The granted roots.
    pub roots: Vec<Root>,
}
