//! # mcpflow-server
//!
//! The protocol engine. One [`Engine`] owns every piece of shared state —
//! sessions, rate buckets, tasks, in-flight executions, subscriptions, and
//! pending server-initiated requests — each behind its own lock, and drives
//! the JSON-RPC dispatch state machine over them.
//!
//! Transports stay thin: they hand the engine a decoded message plus the
//! out-of-band session id and encode whatever comes back. The axum layer in
//! `mcpflow-axum` and the newline-delimited loop in [`framing`] are the two
//! shipped examples.
//!
//! # Example
//!
//! ```rust
//! use mcpflow_server::EngineBuilder;
//! use mcpflow_core::types::{CallToolResult, Tool};
//!
//! # async fn demo() {
//! let engine = EngineBuilder::new("demo-server", "1.0.0").build();
//! engine.register_tool(Tool::new("echo"), |args, _ctx| async move {
//!     Ok(CallToolResult::text(args.to_string()))
//! });
//!
//! let dispatch = engine
//!     .handle_text(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, None)
//!     .await;
//! assert!(dispatch.response.is_some());
//! # }
//! ```

#![warn(clippy::all)]

pub mod bridge;
pub mod builder;
pub mod config;
pub mod context;
pub mod engine;
pub mod framing;
pub mod rate_limit;
pub mod registry;
pub mod session;
pub mod subscriptions;
pub mod suggest;
pub mod tasks;

pub use bridge::{StreamEvent, StreamHandle};
pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use context::{CancellationToken, Context};
pub use engine::{Dispatch, Engine};
