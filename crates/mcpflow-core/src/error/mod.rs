//! Error taxonomy for the protocol engine.
//!
//! [`McpError`] is the single error type flowing through the engine and
//! handler code. [`JsonRpcError`] is its wire form; the conversion between
//! the two is where sanitization happens — internal failures never put
//! their detail on the wire.

pub mod codes;

mod jsonrpc;
mod types;

pub use jsonrpc::JsonRpcError;
pub use types::{BoxError, McpError};
