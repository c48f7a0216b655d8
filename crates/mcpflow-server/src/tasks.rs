//! Task and in-flight registries.
//!
//! Every tool invocation gets one task record, created before the handler
//! runs and finalized exactly once on whichever exit path the invocation
//! takes. The in-flight registry maps the originating request id to a
//! cancellation token for as long as the execution lives — an entry left
//! behind after completion is a bug, not a leak to tolerate.

use crate::context::CancellationToken;
use mcpflow_core::error::JsonRpcError;
use mcpflow_core::pagination::paginate;
use mcpflow_core::protocol::RequestId;
use mcpflow_core::types::Task;
use std::collections::HashMap;
use std::sync::Mutex;

struct TaskTable {
    tasks: HashMap<String, Task>,
    /// Task ids in creation order, for deterministic listing.
    order: Vec<String>,
}

/// Mutex-guarded task map with creation-ordered listing.
pub struct TaskRegistry {
    inner: Mutex<TaskTable>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TaskTable {
                tasks: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Create a pending task for a tool invocation, returning its id.
    pub fn create(&self, request_id: RequestId, tool_name: &str) -> String {
        let task = Task::new(request_id, tool_name);
        let id = task.id.clone();
        let mut table = self.inner.lock().expect("task registry lock");
        table.order.push(id.clone());
        table.tasks.insert(id.clone(), task);
        id
    }

    /// Move a task to `Running`.
    pub fn mark_running(&self, task_id: &str) {
        if let Some(task) = self.inner.lock().expect("task registry lock").tasks.get_mut(task_id) {
            task.start();
        }
    }

    /// Finalize a task with a result. No-op once terminal.
    pub fn mark_completed(&self, task_id: &str, result: serde_json::Value) {
        if let Some(task) = self.inner.lock().expect("task registry lock").tasks.get_mut(task_id) {
            task.complete(result);
        }
    }

    /// Finalize a task with an error. No-op once terminal.
    pub fn mark_failed(&self, task_id: &str, error: JsonRpcError) {
        if let Some(task) = self.inner.lock().expect("task registry lock").tasks.get_mut(task_id) {
            task.fail(error);
        }
    }

    /// Finalize a task as cancelled. No-op once terminal.
    pub fn mark_cancelled(&self, task_id: &str) {
        if let Some(task) = self.inner.lock().expect("task registry lock").tasks.get_mut(task_id) {
            task.cancel();
        }
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.lock().expect("task registry lock").tasks.get(task_id).cloned()
    }

    /// One page of tasks in creation order.
    #[must_use]
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Task>, Option<String>) {
        let table = self.inner.lock().expect("task registry lock");
        let snapshot: Vec<Task> = table
            .order
            .iter()
            .filter_map(|id| table.tasks.get(id).cloned())
            .collect();
        paginate(&snapshot, cursor, page_size)
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("task registry lock").tasks.len()
    }

    /// Whether no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps a live request id to its cancellation token.
///
/// Entries exist strictly for the duration of one tool execution.
pub struct InFlightRegistry {
    inner: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Track an execution.
    pub fn insert(&self, request_id: RequestId, token: CancellationToken) {
        self.inner.lock().expect("in-flight lock").insert(request_id, token);
    }

    /// Trigger cooperative cancellation for a request.
    ///
    /// Unknown ids are a no-op: a client racing a completion with a cancel
    /// must not see a fault. Returns whether an execution was signalled.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        if let Some(token) = self.inner.lock().expect("in-flight lock").get(request_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Stop tracking an execution. Called on every exit path.
    pub fn remove(&self, request_id: &RequestId) {
        self.inner.lock().expect("in-flight lock").remove(request_id);
    }

    /// Whether a request is currently executing.
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.inner.lock().expect("in-flight lock").contains_key(request_id)
    }

    /// Number of live executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("in-flight lock").len()
    }

    /// Whether nothing is executing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
