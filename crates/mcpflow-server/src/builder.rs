//! Engine construction.

use crate::config::EngineConfig;
use crate::engine::Engine;
use mcpflow_core::capability::{ServerCapabilities, ServerInfo};

/// Builder for an [`Engine`].
///
/// Capabilities default to the full set this engine implements; narrow
/// them when a deployment exposes less.
///
/// # Example
///
/// ```rust
/// use mcpflow_server::{EngineBuilder, EngineConfig};
///
/// let engine = EngineBuilder::new("search-server", "1.4.0")
///     .instructions("Call `search` before answering questions.")
///     .config(EngineConfig::default().page_size(25))
///     .build();
/// ```
pub struct EngineBuilder {
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Start building an engine for the named server.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: ServerInfo::new(name, version),
            capabilities: ServerCapabilities::new()
                .with_tools()
                .with_resources()
                .with_prompts()
                .with_tasks()
                .with_completions(),
            instructions: None,
            config: EngineConfig::default(),
        }
    }

    /// Replace the advertised capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the usage instructions returned from `initialize`.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Replace the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        Engine::new(
            self.server_info,
            self.capabilities,
            self.instructions,
            self.config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_advertise_everything() {
        let engine = EngineBuilder::new("s", "1.0.0").build();
        assert!(engine.config().strict_sessions);
    }

    #[test]
    fn capabilities_can_be_narrowed() {
        let engine = EngineBuilder::new("s", "1.0.0")
            .capabilities(ServerCapabilities::new().with_tools())
            .config(EngineConfig::lenient())
            .build();
        assert!(!engine.config().strict_sessions);
    }
}
