//! HTTP handlers.

use crate::error::{respond_error, TransportError};
use crate::state::AppState;
use crate::SESSION_HEADER;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mcpflow_core::error::JsonRpcError;
use mcpflow_core::protocol::Request;
use serde_json::Value;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

fn header_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn accepts_sse(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn attach_session(response: &mut Response, session_id: Option<String>) {
    if let Some(sid) = session_id {
        if let Ok(value) = HeaderValue::from_str(&sid) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
}

/// `POST /mcp` — dispatch one JSON-RPC message.
///
/// Responses carry the `mcp-session-id` header back (including the fresh
/// id minted by `initialize`). Notifications answer `202 Accepted` with no
/// body. A `tools/call` whose request accepts `text/event-stream` streams
/// its call as SSE frames instead of answering with one JSON body.
pub async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let session_id = header_session(&headers);

    let payload: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unparseable request body");
            let error = JsonRpcError::parse_error(format!("invalid JSON: {e}"));
            return Json(serde_json::json!({"jsonrpc":"2.0","id":null,"error":error}))
                .into_response();
        }
    };

    if accepts_sse(&headers) {
        if let Ok(request) = serde_json::from_value::<Request>(payload.clone()) {
            if request.method() == "tools/call" {
                debug!(id = %request.id, "streaming tool call");
                return stream_call(&state, &request, session_id.as_deref());
            }
        }
    }

    let dispatch = state
        .engine
        .handle_value(payload, session_id.as_deref())
        .await;
    let session_header = dispatch.new_session.or(session_id);

    let mut response = match dispatch.response {
        None => StatusCode::ACCEPTED.into_response(),
        Some(value) => Json(value).into_response(),
    };
    attach_session(&mut response, session_header);
    response
}

fn stream_call(state: &AppState, request: &Request, session_id: Option<&str>) -> Response {
    match state.engine.open_stream(request, session_id) {
        // Gate failures arrive as a ready JSON-RPC error, not a stream.
        Err(error_response) => Json(error_response).into_response(),
        Ok(mut handle) => {
            let stream = async_stream::stream! {
                while let Some(event) = handle.next().await {
                    yield Ok::<Event, Infallible>(
                        Event::default()
                            .event(event.event_name())
                            .data(event.payload().to_string()),
                    );
                }
            };
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
    }
}

/// `GET /mcp` — the per-session notification stream.
pub async fn handle_sse(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_session(&headers) else {
        return TransportError::MissingSession.into_response();
    };
    if !state.engine.sessions().contains(&session_id) {
        return TransportError::UnknownSession.into_response();
    }

    info!(session_id = %session_id, "notification stream opened");
    let mut rx = state.channels.subscribe(&session_id);
    let stream = async_stream::stream! {
        yield Ok::<Event, Infallible>(
            Event::default().event("connected").data(session_id.clone()));
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    yield Ok(Event::default().event("message").data(frame));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// `DELETE /mcp` — terminate the session named by the header.
pub async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_session(&headers) else {
        return TransportError::MissingSession.into_response();
    };
    if state.engine.terminate_session(&session_id) {
        state.channels.remove(&session_id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        TransportError::UnknownSession.into_response()
    }
}

/// `POST /mcp/respond` — resolve a pending server-initiated request.
pub async fn handle_respond(State(state): State<AppState>, body: String) -> Response {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => return TransportError::InvalidBody(e.to_string()).into_response(),
    };

    match state.engine.resolve_response(&payload) {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({"ok": true}))).into_response(),
        Err(error) => {
            debug!(error = %error, "respond channel rejected a payload");
            respond_error(&error)
        }
    }
}
