//! Registration-ordered registries for tools, resources, prompts, and
//! completion providers.
//!
//! Listings paginate in registration order, so each registry keeps an
//! insertion vector beside its name index. Handlers are boxed async
//! functions; everything here is read-mostly after startup.

use crate::context::Context;
use futures::future::BoxFuture;
use mcpflow_core::error::McpError;
use mcpflow_core::types::{
    CallToolResult, GetPromptResult, Prompt, Resource, ResourceContents, ResourceTemplate, Tool,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// A boxed async tool handler.
pub type ToolHandlerFn = Arc<
    dyn Fn(Value, Arc<Context>) -> BoxFuture<'static, Result<CallToolResult, McpError>>
        + Send
        + Sync,
>;

/// A boxed async resource reader.
pub type ResourceHandlerFn = Arc<
    dyn Fn(String, Arc<Context>) -> BoxFuture<'static, Result<Vec<ResourceContents>, McpError>>
        + Send
        + Sync,
>;

/// A boxed async prompt renderer.
pub type PromptHandlerFn = Arc<
    dyn Fn(
            Option<serde_json::Map<String, Value>>,
            Arc<Context>,
        ) -> BoxFuture<'static, Result<GetPromptResult, McpError>>
        + Send
        + Sync,
>;

/// A boxed async completion provider: `(argument name, partial value)` →
/// suggested values.
pub type CompletionHandlerFn =
    Arc<dyn Fn(String, String) -> BoxFuture<'static, Result<Vec<String>, McpError>> + Send + Sync>;

/// A registered tool: metadata plus handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Tool metadata.
    pub tool: Tool,
    /// Handler function.
    pub handler: ToolHandlerFn,
}

struct Ordered<T> {
    order: Vec<String>,
    by_key: HashMap<String, T>,
}

impl<T> Ordered<T> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    fn insert(&mut self, key: String, value: T) {
        if !self.by_key.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.by_key.insert(key, value);
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|k| self.by_key.get(k))
    }
}

/// Tool registry.
pub struct ToolRegistry {
    inner: RwLock<Ordered<RegisteredTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Ordered::new()),
        }
    }

    /// Register a tool with its handler. Re-registering a name replaces
    /// the handler but keeps the original position.
    pub fn register<F, Fut>(&self, tool: Tool, handler: F)
    where
        F: Fn(Value, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult, McpError>> + Send + 'static,
    {
        let name = tool.name.clone();
        let handler: ToolHandlerFn = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self.inner
            .write()
            .expect("tool registry lock")
            .insert(name, RegisteredTool { tool, handler });
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<RegisteredTool> {
        self.inner.read().expect("tool registry lock").by_key.get(name).cloned()
    }

    /// All tool definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        self.inner
            .read()
            .expect("tool registry lock")
            .values()
            .map(|r| r.tool.clone())
            .collect()
    }

    /// All registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.read().expect("tool registry lock").order.clone()
    }
}

#[derive(Clone)]
struct RegisteredResource {
    resource: Resource,
    handler: ResourceHandlerFn,
}

/// Resource registry: concrete resources plus URI templates.
pub struct ResourceRegistry {
    inner: RwLock<Ordered<RegisteredResource>>,
    templates: RwLock<Vec<ResourceTemplate>>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Ordered::new()),
            templates: RwLock::new(Vec::new()),
        }
    }

    /// Register a resource with its reader.
    pub fn register<F, Fut>(&self, resource: Resource, handler: F)
    where
        F: Fn(String, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResourceContents>, McpError>> + Send + 'static,
    {
        let uri = resource.uri.clone();
        let handler: ResourceHandlerFn = Arc::new(move |uri, ctx| Box::pin(handler(uri, ctx)));
        self.inner
            .write()
            .expect("resource registry lock")
            .insert(uri, RegisteredResource { resource, handler });
    }

    /// Register a URI template (listing only; reads resolve against
    /// concrete resources).
    pub fn register_template(&self, template: ResourceTemplate) {
        self.templates.write().expect("resource registry lock").push(template);
    }

    /// The reader for a URI, if one is registered.
    #[must_use]
    pub fn reader(&self, uri: &str) -> Option<ResourceHandlerFn> {
        self.inner
            .read()
            .expect("resource registry lock")
            .by_key
            .get(uri)
            .map(|r| r.handler.clone())
    }

    /// All resource definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Resource> {
        self.inner
            .read()
            .expect("resource registry lock")
            .values()
            .map(|r| r.resource.clone())
            .collect()
    }

    /// All templates in registration order.
    #[must_use]
    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.templates.read().expect("resource registry lock").clone()
    }
}

#[derive(Clone)]
struct RegisteredPrompt {
    prompt: Prompt,
    handler: PromptHandlerFn,
}

/// Prompt registry.
pub struct PromptRegistry {
    inner: RwLock<Ordered<RegisteredPrompt>>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Ordered::new()),
        }
    }

    /// Register a prompt with its renderer.
    pub fn register<F, Fut>(&self, prompt: Prompt, handler: F)
    where
        F: Fn(Option<serde_json::Map<String, Value>>, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        let name = prompt.name.clone();
        let handler: PromptHandlerFn = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self.inner
            .write()
            .expect("prompt registry lock")
            .insert(name, RegisteredPrompt { prompt, handler });
    }

    /// The renderer for a prompt, if registered.
    #[must_use]
    pub fn renderer(&self, name: &str) -> Option<PromptHandlerFn> {
        self.inner
            .read()
            .expect("prompt registry lock")
            .by_key
            .get(name)
            .map(|r| r.handler.clone())
    }

    /// All prompt definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Prompt> {
        self.inner
            .read()
            .expect("prompt registry lock")
            .values()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

/// Completion providers keyed by `(ref_type, ref_value)`.
pub struct CompletionRegistry {
    inner: RwLock<HashMap<(String, String), CompletionHandlerFn>>,
}

impl Default for CompletionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider for a reference.
    pub fn register<F, Fut>(&self, ref_type: &str, ref_value: &str, handler: F)
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<String>, McpError>> + Send + 'static,
    {
        let handler: CompletionHandlerFn =
            Arc::new(move |name, value| Box::pin(handler(name, value)));
        self.inner
            .write()
            .expect("completion registry lock")
            .insert((ref_type.to_string(), ref_value.to_string()), handler);
    }

    /// The provider for a reference, if registered.
    #[must_use]
    pub fn provider(&self, ref_type: &str, ref_value: &str) -> Option<CompletionHandlerFn> {
        self.inner
            .read()
            .expect("completion registry lock")
            .get(&(ref_type.to_string(), ref_value.to_string()))
            .cloned()
    }
}
