//! Task records tracking tool-invocation lifecycles.
//!
//! A task is created automatically at the start of every tool call; it is
//! not a client-managed resource. Terminal states are immutable — the
//! transition methods refuse to move a task out of one.

use crate::error::JsonRpcError;
use crate::protocol::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet executing.
    Pending,
    /// Executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
}

impl TaskStatus {
    /// Whether this state is final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One tool invocation's tracking record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task id.
    pub id: String,
    /// The JSON-RPC request id of the originating call.
    pub request_id: RequestId,
    /// The tool that was invoked.
    pub tool_name: String,
    /// Current status.
    pub status: TaskStatus,
    /// Result, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// When the task was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the task reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Task {
    /// Create a pending task for a tool invocation.
    #[must_use]
    pub fn new(request_id: RequestId, tool_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id,
            tool_name: tool_name.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `Running`. No-op when already terminal.
    pub fn start(&mut self) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Running;
        }
    }

    /// Finish with a result. No-op when already terminal.
    pub fn complete(&mut self, result: Value) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(chrono::Utc::now());
    }

    /// Finish with an error. No-op when already terminal.
    pub fn fail(&mut self, error: JsonRpcError) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now());
    }

    /// Finish as cancelled. No-op when already terminal.
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(chrono::Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(RequestId::Number(1), "analyze")
    }

    #[test]
    fn lifecycle_reaches_completed() {
        let mut t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        t.start();
        assert_eq!(t.status, TaskStatus::Running);
        t.complete(serde_json::json!({"ok": true}));
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut t = task();
        t.cancel();
        assert_eq!(t.status, TaskStatus::Cancelled);

        t.complete(serde_json::json!(1));
        t.fail(JsonRpcError::internal_error("late"));
        t.start();
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert!(t.result.is_none());
        assert!(t.error.is_none());
    }

    #[test]
    fn failure_records_the_error() {
        let mut t = task();
        t.start();
        t.fail(JsonRpcError::invalid_params("bad shape"));
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.error.as_ref().unwrap().code, -32602);
    }
}
