//! Elicitation types for server-initiated `elicitation/create` requests.

use serde::{Deserialize, Serialize};

/// A request for the client to collect input from its user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitRequest {
    /// What to ask the user.
    pub message: String,
    /// JSON Schema describing the shape of the expected answer.
    pub requested_schema: serde_json::Value,
}

impl ElicitRequest {
    /// Create an elicitation request.
    pub fn new(message: impl Into<String>, requested_schema: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            requested_schema,
        }
    }
}

/// How the user responded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// The user supplied the requested input.
    Accept,
    /// The user explicitly declined.
    Decline,
    /// The user dismissed the request without answering.
    Cancel,
}

/// The client's answer to an elicitation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    /// What the user did.
    pub action: ElicitAction,
    /// The supplied input, present on `Accept`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_uses_lowercase_wire_names() {
        let result: ElicitResult =
            serde_json::from_str(r#"{"action":"accept","content":{"name":"x"}}"#).unwrap();
        assert_eq!(result.action, ElicitAction::Accept);
        assert!(result.content.is_some());
    }
}
