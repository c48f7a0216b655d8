//! Route table.

use crate::handler::{handle_delete, handle_post, handle_respond, handle_sse};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the MCP router over the given state.
#[must_use]
pub fn mcp_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_sse).delete(handle_delete),
        )
        .route("/mcp/respond", post(handle_respond))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_server::EngineBuilder;
    use std::sync::Arc;

    #[test]
    fn router_builds() {
        let engine = Arc::new(EngineBuilder::new("router", "0.0.0").build());
        let _router: Router = mcp_router(AppState::new(engine));
    }
}
