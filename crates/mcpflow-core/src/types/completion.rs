//! Argument completion types for `completion/complete`.

use serde::{Deserialize, Serialize};

/// What the completion is for: a prompt argument or a resource template
/// variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionRef {
    /// A prompt argument.
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// The prompt name.
        name: String,
    },
    /// A resource template variable.
    #[serde(rename = "ref/resource")]
    Resource {
        /// The URI template.
        uri: String,
    },
}

impl CompletionRef {
    /// The `(ref_type, ref_value)` registry key for this reference.
    #[must_use]
    pub fn key(&self) -> (&'static str, &str) {
        match self {
            Self::Prompt { name } => ("ref/prompt", name),
            Self::Resource { uri } => ("ref/resource", uri),
        }
    }
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name.
    pub name: String,
    /// The partial value typed so far.
    pub value: String,
}

/// One batch of completion values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    /// Suggested values.
    pub values: Vec<String>,
    /// Total matches, when known and larger than `values`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Whether more values exist beyond this batch.
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// The result of `completion/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion batch.
    pub completion: Completion,
}

impl CompleteResult {
    /// An empty result — the answer for unknown references and absent
    /// providers.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result from a list of values.
    #[must_use]
    pub fn from_values(values: Vec<String>) -> Self {
        Self {
            completion: Completion {
                total: Some(values.len() as u64),
                has_more: Some(false),
                values,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_parses_tagged_form() {
        let r: CompletionRef =
            serde_json::from_str(r#"{"type":"ref/prompt","name":"greet"}"#).unwrap();
        assert_eq!(r.key(), ("ref/prompt", "greet"));
    }

    #[test]
    fn empty_result_serializes_an_empty_batch() {
        let json = serde_json::to_value(CompleteResult::empty()).unwrap();
        assert_eq!(json["completion"]["values"], serde_json::json!([]));
    }
}
