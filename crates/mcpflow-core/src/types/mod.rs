//! Data model: the things the protocol talks about.

pub mod completion;
pub mod content;
pub mod elicitation;
pub mod prompt;
pub mod resource;
pub mod root;
pub mod sampling;
pub mod task;
pub mod tool;

pub use completion::{CompleteResult, Completion, CompletionArgument, CompletionRef};
pub use content::{Content, Role};
pub use elicitation::{ElicitAction, ElicitRequest, ElicitResult};
pub use prompt::{GetPromptResult, Prompt, PromptArgument, PromptMessage};
pub use resource::{ReadResourceResult, Resource, ResourceContents, ResourceTemplate};
pub use root::{ListRootsResult, Root};
pub use sampling::{CreateMessageRequest, CreateMessageResult, SamplingMessage};
pub use task::{Task, TaskStatus};
pub use tool::{CallToolResult, Tool};
