//! # mcpflow-core
//!
//! Wire types and data model for the mcpflow protocol engine.
//!
//! This crate provides the foundation the server crate builds on:
//!
//! - **Envelope**: JSON-RPC 2.0 request/response/notification types
//! - **Errors**: the [`McpError`] taxonomy and its wire form [`JsonRpcError`]
//! - **Capabilities**: initialize handshake types and version negotiation
//! - **Pagination**: opaque offset cursors and the pure page function
//! - **Data model**: tools, resources, prompts, tasks, sampling,
//!   elicitation, and roots
//!
//! The crate is runtime-agnostic: it depends on no async runtime and holds
//! no mutable state. Everything stateful lives in `mcpflow-server`.
//!
//! # Example
//!
//! ```rust
//! use mcpflow_core::protocol::{Request, RequestId};
//! use mcpflow_core::types::Tool;
//!
//! let tool = Tool::new("search")
//!     .description("Search the index")
//!     .input_schema(serde_json::json!({
//!         "type": "object",
//!         "properties": { "query": { "type": "string" } }
//!     }));
//!
//! let request = Request::with_params(
//!     "tools/call",
//!     RequestId::Number(1),
//!     serde_json::json!({ "name": tool.name, "arguments": { "query": "x" } }),
//! );
//! assert_eq!(request.method(), "tools/call");
//! ```

#![warn(clippy::all)]

pub mod capability;
pub mod error;
pub mod pagination;
pub mod protocol;
pub mod types;

pub use capability::{
    negotiate_version, ClientCapabilities, ClientInfo, InitializeResult, ServerCapabilities,
    ServerInfo, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
pub use error::{codes, JsonRpcError, McpError};
pub use pagination::{decode_cursor, encode_cursor, paginate};
pub use protocol::{Message, Notification, Request, RequestId, Response};
