//! # mcpflow-axum
//!
//! The HTTP face of the mcpflow engine:
//!
//! - `POST /mcp` — JSON-RPC dispatch. Tool calls stream as SSE when the
//!   request accepts `text/event-stream`; everything else answers as JSON.
//!   Notifications get `202 Accepted` and no body.
//! - `GET /mcp` — a per-session SSE channel for server-pushed
//!   notifications (resource updates).
//! - `DELETE /mcp` — explicit session termination.
//! - `POST /mcp/respond` — the respond side-channel resolving pending
//!   server-initiated requests by id.
//!
//! Session correlation rides the `mcp-session-id` header in both
//! directions.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpflow_axum::{mcp_router, AppState};
//! use mcpflow_server::EngineBuilder;
//! use std::sync::Arc;
//!
//! # async fn serve() {
//! let engine = Arc::new(EngineBuilder::new("my-server", "1.0.0").build());
//! let app = mcp_router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```

#![warn(clippy::all)]

mod error;
mod handler;
mod router;
mod state;

pub use error::TransportError;
pub use router::mcp_router;
pub use state::{AppState, SessionChannels};

/// The header carrying the out-of-band session id.
pub const SESSION_HEADER: &str = "mcp-session-id";
