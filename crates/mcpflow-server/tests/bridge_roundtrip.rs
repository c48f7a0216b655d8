//! Streamed calls and the bidirectional bridge, end to end.

use mcpflow_core::protocol::{Request, RequestId};
use mcpflow_core::types::{CallToolResult, ElicitRequest, Tool};
use mcpflow_server::{Engine, EngineBuilder, EngineConfig, StreamEvent};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn streaming_engine() -> Arc<Engine> {
    let engine = EngineBuilder::new("bridge", "0.0.0")
        .config(EngineConfig::lenient().bridge_timeout(Duration::from_secs(5)))
        .build();

    // Asks the client for a display name mid-call, then greets it.
    engine.register_tool(Tool::new("greet_interactively"), |_args, ctx| async move {
        let answer = ctx
            .elicit(ElicitRequest::new(
                "What is your name?",
                json!({"type":"object","properties":{"name":{"type":"string"}}}),
            ))
            .await?;
        let name = answer
            .content
            .as_ref()
            .and_then(|c| c.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("stranger")
            .to_string();
        Ok(CallToolResult::text(format!("Hello, {name}!")))
    });

    // Parks forever unless cancelled; for disconnect tests.
    engine.register_tool(Tool::new("park"), |_args, ctx| async move {
        ctx.cancelled().await;
        Err(mcpflow_core::McpError::Cancelled)
    });

    Arc::new(engine)
}

fn call_request(id: u64, tool: &str) -> Request {
    Request::with_params(
        "tools/call",
        RequestId::Number(id),
        json!({"name": tool, "arguments": {}}),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_request_round_trip_through_the_respond_channel() {
    let engine = streaming_engine();
    let mut stream = engine
        .open_stream(&call_request(1, "greet_interactively"), None)
        .expect("stream opens");

    // First event: the server-initiated elicitation request.
    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("event arrives")
        .expect("stream not ended");
    assert_eq!(event.event_name(), "server_request");
    let payload = event.payload();
    assert_eq!(payload["method"], "elicitation/create");
    let correlation = payload["id"].clone();
    assert_eq!(engine.pending().len(), 1);

    // An uncorrelated answer is rejected and disturbs nothing.
    let err = engine
        .resolve_response(&json!({"jsonrpc":"2.0","id":"not-pending","result":{}}))
        .unwrap_err();
    assert!(err.to_string().contains("no pending request"));
    assert_eq!(engine.pending().len(), 1);

    // The correlated answer resumes the tool.
    engine
        .resolve_response(&json!({"jsonrpc":"2.0","id":correlation,
            "result":{"action":"accept","content":{"name":"Ada"}}}))
        .expect("correlated respond resolves");

    // Final event: the call's own response.
    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("final event arrives")
        .expect("stream not ended");
    assert_eq!(event.event_name(), "message");
    assert_eq!(event.payload()["result"]["content"][0]["text"], "Hello, Ada!");

    // The stream ends after the final message and nothing is left behind.
    assert!(stream.next().await.is_none());
    assert!(engine.pending().is_empty());
    assert!(engine.in_flight().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_stream_cancels_the_call_and_discards_waiters() {
    let engine = streaming_engine();
    let stream = engine
        .open_stream(&call_request(2, "park"), None)
        .expect("stream opens");
    assert!(engine.in_flight().contains(&RequestId::Number(2)));

    // Consumer disconnects.
    drop(stream);

    for _ in 0..500 {
        if engine.in_flight().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(engine.in_flight().is_empty());
    assert!(engine.pending().is_empty());

    let (tasks, _) = engine.tasks().list(None, 10);
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].status.is_terminal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bridge_timeout_surfaces_into_the_tool_and_fails_the_call() {
    let engine = Arc::new(
        EngineBuilder::new("bridge", "0.0.0")
            .config(EngineConfig::lenient().bridge_timeout(Duration::from_millis(50)))
            .build(),
    );
    engine.register_tool(Tool::new("impatient"), |_args, ctx| async move {
        // Nobody will answer; the await point sees the timeout error.
        ctx.request("roots/list", None).await?;
        Ok(CallToolResult::text("unreachable"))
    });

    let mut stream = engine
        .open_stream(&call_request(3, "impatient"), None)
        .expect("stream opens");

    let first = stream.next().await.expect("server request event");
    assert_eq!(first.event_name(), "server_request");

    let last = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timeout resolves the call")
        .expect("final event");
    assert_eq!(last.event_name(), "message");
    // Sanitized on the wire; the pending entry is gone.
    assert_eq!(last.payload()["error"]["code"], -32603);
    assert!(engine.pending().is_empty());

    let (tasks, _) = engine.tasks().list(None, 10);
    assert_eq!(tasks[0].status, mcpflow_core::types::TaskStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streamed_gate_failures_come_back_as_a_ready_error() {
    let engine = Arc::new(EngineBuilder::new("bridge", "0.0.0").build()); // strict
    let error = engine
        .open_stream(&call_request(4, "anything"), None)
        .expect_err("strict mode rejects sessionless streams");
    assert_eq!(error["error"]["code"], -32600);
    assert!(engine.tasks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn notifications_flow_as_message_events_in_order() {
    let engine = Arc::new(
        EngineBuilder::new("bridge", "0.0.0")
            .config(EngineConfig::lenient())
            .build(),
    );
    engine.register_tool(Tool::new("chatty"), |_args, ctx| async move {
        ctx.progress(1, Some(3), Some("step one"));
        ctx.progress(2, Some(3), Some("step two"));
        Ok(CallToolResult::text("done"))
    });

    let mut stream = engine
        .open_stream(&call_request(5, "chatty"), None)
        .expect("stream opens");

    let mut kinds = Vec::new();
    let mut progress = Vec::new();
    while let Some(event) = stream.next().await {
        kinds.push(event.event_name());
        if let StreamEvent::Message(payload) = &event {
            if payload["method"] == "notifications/progress" {
                progress.push(payload["params"]["progress"].as_u64().unwrap());
            }
        }
    }
    assert_eq!(kinds, vec!["message", "message", "message"]);
    assert_eq!(progress, vec![1, 2]);
}
