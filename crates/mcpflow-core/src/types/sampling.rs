//! Sampling types for server-initiated `sampling/createMessage` requests.

use super::content::{Content, Role};
use serde::{Deserialize, Serialize};

/// One message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Speaker role.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

impl SamplingMessage {
    /// A user-role text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }
}

/// A request for the client to sample its model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    /// Conversation so far.
    pub messages: Vec<SamplingMessage>,
    /// System prompt, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Token ceiling for the completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl CreateMessageRequest {
    /// A single-user-message request.
    pub fn from_text(text: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            messages: vec![SamplingMessage::user(text)],
            system_prompt: None,
            max_tokens,
            temperature: None,
        }
    }
}

/// The client's answer to a sampling request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    /// Role of the sampled message.
    pub role: Role,
    /// Sampled content.
    pub content: Content,
    /// Which model produced it.
    pub model: String,
    /// Why sampling stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}
