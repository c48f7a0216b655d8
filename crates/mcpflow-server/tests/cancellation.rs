//! Cancellation convergence: notifications, tasks/cancel, and cleanup on
//! every exit path.

use mcpflow_core::types::{CallToolResult, TaskStatus, Tool};
use mcpflow_server::{Engine, EngineBuilder, EngineConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn engine_with_sleeper() -> Arc<Engine> {
    let engine = EngineBuilder::new("cancel", "0.0.0")
        .config(EngineConfig::lenient())
        .build();
    engine.register_tool(Tool::new("sleep"), |_args, ctx| async move {
        // Cooperative: park until cancelled or a long timer fires.
        tokio::select! {
            () = ctx.cancelled() => Err(mcpflow_core::McpError::Cancelled),
            () = tokio::time::sleep(Duration::from_secs(60)) => {
                Ok(CallToolResult::text("woke up"))
            }
        }
    });
    Arc::new(engine)
}

async fn send(engine: &Engine, body: Value) -> Value {
    engine
        .handle_value(body, None)
        .await
        .response
        .expect("request produces a response")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_notification_converges_and_cleans_up() {
    let engine = engine_with_sleeper();

    let caller = engine.clone();
    let call = tokio::spawn(async move {
        send(
            &caller,
            json!({"jsonrpc":"2.0","id":"req-1","method":"tools/call",
                "params":{"name":"sleep","arguments":{}}}),
        )
        .await
    });

    {
        let engine = engine.clone();
        wait_until(move || !engine.in_flight().is_empty()).await;
    }

    // The cancellation arrives as a notification carrying the request id.
    let dispatch = engine
        .handle_value(
            json!({"jsonrpc":"2.0","method":"notifications/cancelled",
                "params":{"requestId":"req-1","reason":"user gave up"}}),
            None,
        )
        .await;
    assert!(dispatch.response.is_none());

    let response = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("call unblocks promptly")
        .unwrap();
    assert_eq!(response["error"]["code"], -32800);

    assert!(engine.in_flight().is_empty());
    let (tasks, _) = engine.tasks().list(None, 10);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_cancel_converges_with_the_running_execution() {
    let engine = engine_with_sleeper();

    let caller = engine.clone();
    let call = tokio::spawn(async move {
        send(
            &caller,
            json!({"jsonrpc":"2.0","id":1,"method":"tools/call",
                "params":{"name":"sleep","arguments":{}}}),
        )
        .await
    });

    {
        let engine = engine.clone();
        wait_until(move || !engine.in_flight().is_empty()).await;
    }
    let (tasks, _) = engine.tasks().list(None, 10);
    let task_id = tasks[0].id.clone();

    let cancelled = send(
        &engine,
        json!({"jsonrpc":"2.0","id":2,"method":"tasks/cancel","params":{"taskId":task_id}}),
    )
    .await;
    assert_eq!(cancelled["result"]["cancelled"], true);

    let response = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("call unblocks promptly")
        .unwrap();
    assert_eq!(response["error"]["code"], -32800);

    // Cancelling again, and cancelling nonsense, are clean no-ops.
    let again = send(
        &engine,
        json!({"jsonrpc":"2.0","id":3,"method":"tasks/cancel",
            "params":{"taskId": engine.tasks().list(None, 10).0[0].id}}),
    )
    .await;
    assert_eq!(again["result"]["cancelled"], false);

    let unknown = send(
        &engine,
        json!({"jsonrpc":"2.0","id":4,"method":"tasks/cancel","params":{"taskId":"ghost"}}),
    )
    .await;
    assert_eq!(unknown["result"]["cancelled"], false);

    let (tasks, _) = engine.tasks().list(None, 10);
    assert_eq!(tasks[0].status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancelling_an_unknown_request_id_is_a_noop() {
    let engine = engine_with_sleeper();
    let dispatch = engine
        .handle_value(
            json!({"jsonrpc":"2.0","method":"notifications/cancelled",
                "params":{"requestId":"never-seen"}}),
            None,
        )
        .await;
    assert!(dispatch.response.is_none());
    assert!(engine.tasks().is_empty());

    // Missing requestId entirely: also swallowed.
    let dispatch = engine
        .handle_value(
            json!({"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}),
            None,
        )
        .await;
    assert!(dispatch.response.is_none());
}

#[tokio::test]
async fn cancelling_a_pending_task_without_execution_finalizes_it() {
    let engine = EngineBuilder::new("cancel", "0.0.0")
        .config(EngineConfig::lenient())
        .build();
    // A task with no in-flight entry, as after a crashed-and-cleaned call.
    let task_id = engine
        .tasks()
        .create(mcpflow_core::RequestId::Number(9), "orphan");

    let response = engine
        .handle_value(
            json!({"jsonrpc":"2.0","id":1,"method":"tasks/cancel","params":{"taskId":task_id}}),
            None,
        )
        .await
        .response
        .unwrap();
    assert_eq!(response["result"]["cancelled"], true);
    assert_eq!(
        engine.tasks().get(&task_id).unwrap().status,
        TaskStatus::Cancelled
    );
}

#[tokio::test]
async fn successful_and_failing_calls_clean_the_in_flight_registry() {
    let engine = EngineBuilder::new("cancel", "0.0.0")
        .config(EngineConfig::lenient())
        .build();
    engine.register_tool(Tool::new("ok"), |_, _| async { Ok(CallToolResult::text("fine")) });
    engine.register_tool(Tool::new("err"), |_, _| async {
        Err(mcpflow_core::McpError::invalid_params("tools/call", "bad input"))
    });

    for (id, name) in [(1, "ok"), (2, "err")] {
        let _ = engine
            .handle_value(
                json!({"jsonrpc":"2.0","id":id,"method":"tools/call",
                    "params":{"name":name,"arguments":{}}}),
                None,
            )
            .await;
    }

    assert!(engine.in_flight().is_empty());
    let (tasks, _) = engine.tasks().list(None, 10);
    let statuses: Vec<TaskStatus> = tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Completed, TaskStatus::Failed]);
}
