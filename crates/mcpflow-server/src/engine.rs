//! The protocol engine: a state machine over one incoming message.
//!
//! Dispatch order for a request, in full:
//!
//! 1. malformed JSON never gets past parsing — `ParseError`, no side effects
//! 2. notifications are routed and swallowed; they never produce a response
//! 3. strict-mode session gate (`initialize` and `ping` are exempt: bootstrap
//!    and liveness must not deadlock on session state)
//! 4. per-session rate gate — a rejected request creates no task
//! 5. body and argument-count ceilings — rejected before any handler runs
//! 6. method routing
//! 7. unknown method → `MethodNotFound`
//!
//! Every tool invocation gets a task record and an in-flight entry, both
//! finalized on every exit path: return, handler error, panic, and
//! cancellation.

use crate::bridge::{ClientBridge, PendingRequests, StreamEvent, StreamHandle};
use crate::config::EngineConfig;
use crate::context::{CancellationToken, Context};
use crate::rate_limit::RateLimiter;
use crate::registry::{
    CompletionRegistry, PromptRegistry, ResourceRegistry, ToolHandlerFn, ToolRegistry,
};
use crate::session::SessionStore;
use crate::subscriptions::SubscriptionRegistry;
use crate::suggest::unknown_tool_message;
use crate::tasks::{InFlightRegistry, TaskRegistry};
use futures::FutureExt;
use mcpflow_core::capability::{
    negotiate_version, ClientCapabilities, ClientInfo, InitializeResult, ServerCapabilities,
    ServerInfo,
};
use mcpflow_core::error::{JsonRpcError, McpError};
use mcpflow_core::pagination::paginate;
use mcpflow_core::protocol::{Message, Notification, Request, RequestId};
use mcpflow_core::types::{
    CallToolResult, CompleteResult, GetPromptResult, Prompt, Resource, ResourceContents,
    ResourceTemplate, TaskStatus, Tool,
};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Request method names.
pub mod methods {
    /// Establish a session and negotiate capabilities.
    pub const INITIALIZE: &str = "initialize";
    /// Liveness check; side-effect free.
    pub const PING: &str = "ping";

    /// List tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool.
    pub const TOOLS_CALL: &str = "tools/call";

    /// List resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Read a resource.
    pub const RESOURCES_READ: &str = "resources/read";
    /// List resource templates.
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    /// Subscribe to resource updates.
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    /// Unsubscribe from resource updates.
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

    /// List prompts.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Render a prompt.
    pub const PROMPTS_GET: &str = "prompts/get";

    /// List tasks.
    pub const TASKS_LIST: &str = "tasks/list";
    /// Get one task.
    pub const TASKS_GET: &str = "tasks/get";
    /// Cancel a task.
    pub const TASKS_CANCEL: &str = "tasks/cancel";
    /// Fetch a terminal task's outcome.
    pub const TASKS_RESULT: &str = "tasks/result";

    /// Argument completion.
    pub const COMPLETION_COMPLETE: &str = "completion/complete";
}

/// Notification method names.
pub mod notifications {
    /// Client finished its side of the handshake.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Client cancels an in-flight request.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Progress report.
    pub const PROGRESS: &str = "notifications/progress";
    /// A subscribed resource changed.
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    /// The client's root set changed.
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
}

/// The outcome of dispatching one message.
#[derive(Debug)]
pub struct Dispatch {
    /// The JSON-RPC response to send, if any. Notifications produce none.
    pub response: Option<Value>,
    /// A session id created by this message (`initialize` only); the
    /// transport surfaces it out of band.
    pub new_session: Option<String>,
}

impl Dispatch {
    fn none() -> Self {
        Self {
            response: None,
            new_session: None,
        }
    }

    fn respond(response: Value) -> Self {
        Self {
            response: Some(response),
            new_session: None,
        }
    }
}

fn success(id: &RequestId, result: Value) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Option<&RequestId>, error: &JsonRpcError) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

fn fail_with(id: Option<&RequestId>, error: &McpError) -> Value {
    failure(id, &JsonRpcError::from(error))
}

/// One page of serializable items under a named key.
fn page_result<T: serde::Serialize>(key: &str, items: Vec<T>, next: Option<String>) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert(
        key.to_string(),
        serde_json::to_value(items).unwrap_or_default(),
    );
    if let Some(cursor) = next {
        obj.insert("nextCursor".to_string(), Value::String(cursor));
    }
    Value::Object(obj)
}

/// The protocol engine.
///
/// Owns all shared state behind per-registry locks and exposes a narrow
/// dispatch API to transports. Construct through [`crate::EngineBuilder`].
pub struct Engine {
    config: EngineConfig,
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    sessions: SessionStore,
    rate: RateLimiter,
    tasks: TaskRegistry,
    in_flight: InFlightRegistry,
    subscriptions: SubscriptionRegistry,
    pending: Arc<PendingRequests>,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    completions: CompletionRegistry,
}

impl Engine {
    pub(crate) fn new(
        server_info: ServerInfo,
        capabilities: ServerCapabilities,
        instructions: Option<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions: SessionStore::new(config.max_sessions),
            rate: RateLimiter::new(config.rate_burst, config.rate_per_second),
            tasks: TaskRegistry::new(),
            in_flight: InFlightRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
            pending: Arc::new(PendingRequests::new()),
            tools: ToolRegistry::new(),
            resources: ResourceRegistry::new(),
            prompts: PromptRegistry::new(),
            completions: CompletionRegistry::new(),
            config,
            server_info,
            capabilities,
            instructions,
        }
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The task registry.
    #[must_use]
    pub const fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// The in-flight registry.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// The resource subscription registry.
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// The pending server-request map (respond channel target).
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a tool.
    pub fn register_tool<F, Fut>(&self, tool: Tool, handler: F)
    where
        F: Fn(Value, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult, McpError>> + Send + 'static,
    {
        self.tools.register(tool, handler);
    }

    /// Register a resource.
    pub fn register_resource<F, Fut>(&self, resource: Resource, handler: F)
    where
        F: Fn(String, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResourceContents>, McpError>> + Send + 'static,
    {
        self.resources.register(resource, handler);
    }

    /// Register a resource template.
    pub fn register_resource_template(&self, template: ResourceTemplate) {
        self.resources.register_template(template);
    }

    /// Register a prompt.
    pub fn register_prompt<F, Fut>(&self, prompt: Prompt, handler: F)
    where
        F: Fn(Option<serde_json::Map<String, Value>>, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        self.prompts.register(prompt, handler);
    }

    /// Register a completion provider for `(ref_type, ref_value)`.
    pub fn register_completion<F, Fut>(&self, ref_type: &str, ref_value: &str, handler: F)
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<String>, McpError>> + Send + 'static,
    {
        self.completions.register(ref_type, ref_value, handler);
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatch one raw frame.
    pub async fn handle_text(&self, raw: &str, session_id: Option<&str>) -> Dispatch {
        match serde_json::from_str::<Value>(raw) {
            Ok(payload) => self.handle_value(payload, session_id).await,
            Err(e) => Dispatch::respond(failure(
                None,
                &JsonRpcError::parse_error(format!("invalid JSON: {e}")),
            )),
        }
    }

    /// Dispatch one decoded JSON value.
    pub async fn handle_value(&self, payload: Value, session_id: Option<&str>) -> Dispatch {
        if !payload.is_object() {
            return Dispatch::respond(failure(
                None,
                &JsonRpcError::invalid_request("payload must be a JSON object"),
            ));
        }

        let raw_id = payload.get("id").cloned();
        let message: Message = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(e) => {
                let id = raw_id.and_then(|v| serde_json::from_value::<RequestId>(v).ok());
                return Dispatch::respond(failure(
                    id.as_ref(),
                    &JsonRpcError::invalid_request(format!("invalid JSON-RPC message: {e}")),
                ));
            }
        };

        match message {
            Message::Notification(notification) => {
                self.handle_notification(&notification);
                Dispatch::none()
            }
            Message::Response(response) => Dispatch::respond(failure(
                Some(&response.id),
                &JsonRpcError::invalid_request("responses belong on the respond channel"),
            )),
            Message::Request(request) => {
                let (response, new_session) = self.handle_request(request, session_id).await;
                Dispatch {
                    response: Some(response),
                    new_session,
                }
            }
        }
    }

    /// Route a notification. Never produces a response; failures are
    /// logged and swallowed.
    fn handle_notification(&self, notification: &Notification) {
        match notification.method() {
            notifications::INITIALIZED => {
                tracing::debug!("client completed initialization");
            }
            notifications::CANCELLED => {
                let request_id = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok());
                match request_id {
                    Some(id) => {
                        let signalled = self.in_flight.cancel(&id);
                        tracing::debug!(request_id = %id, signalled, "cancellation notification");
                    }
                    // Unknown or missing id is a no-op, not a fault.
                    None => tracing::debug!("cancellation notification without a usable requestId"),
                }
            }
            notifications::PROGRESS | notifications::ROOTS_LIST_CHANGED => {}
            other => {
                tracing::debug!(method = %other, "ignoring unknown notification");
            }
        }
    }

    /// Admission gates: session, rate, size. Run before any handler.
    fn gate(&self, request: &Request, session_id: Option<&str>) -> Result<(), McpError> {
        let method = request.method();
        let bootstrap = matches!(method, methods::INITIALIZE | methods::PING);

        if self.config.strict_sessions && !bootstrap {
            match session_id {
                Some(sid) if self.sessions.contains(sid) => {}
                _ => return Err(McpError::invalid_request("session not initialized")),
            }
        }

        if method != methods::INITIALIZE {
            if let Some(sid) = session_id {
                if !self.rate.allow(sid) {
                    return Err(McpError::RateLimited {
                        retry_after: self.rate.retry_after(sid),
                    });
                }
            }
        }

        if let Some(params) = request.params.as_ref() {
            let body = serde_json::to_string(params)
                .map_err(|e| McpError::internal_with("params did not serialize", e))?;
            if body.len() > self.config.max_body_bytes {
                return Err(McpError::invalid_params(
                    method.to_string(),
                    format!("params exceed the {}-byte limit", self.config.max_body_bytes),
                ));
            }
            if let Some(args) = params.get("arguments").and_then(Value::as_object) {
                if args.len() > self.config.max_argument_keys {
                    return Err(McpError::invalid_params(
                        method.to_string(),
                        format!(
                            "arguments exceed the {}-key limit",
                            self.config.max_argument_keys
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    async fn handle_request(
        &self,
        request: Request,
        session_id: Option<&str>,
    ) -> (Value, Option<String>) {
        let id = request.id.clone();
        let method = request.method.to_string();

        if let Some(sid) = session_id {
            self.sessions.touch(sid);
        }

        if let Err(e) = self.gate(&request, session_id) {
            tracing::warn!(method = %method, error = %e, "request rejected at the gate");
            return (fail_with(Some(&id), &e), None);
        }

        let params = request.params.as_ref();
        tracing::debug!(method = %method, id = %id, "dispatching request");

        let response = match method.as_str() {
            methods::INITIALIZE => return self.handle_initialize(&id, params),
            methods::PING => success(&id, serde_json::json!({})),

            methods::TOOLS_LIST => {
                let (page, next) = paginate(&self.tools.list(), cursor(params), self.config.page_size);
                success(&id, page_result("tools", page, next))
            }
            methods::RESOURCES_LIST => {
                let (page, next) =
                    paginate(&self.resources.list(), cursor(params), self.config.page_size);
                success(&id, page_result("resources", page, next))
            }
            methods::RESOURCES_TEMPLATES_LIST => {
                let (page, next) = paginate(
                    &self.resources.list_templates(),
                    cursor(params),
                    self.config.page_size,
                );
                success(&id, page_result("resourceTemplates", page, next))
            }
            methods::PROMPTS_LIST => {
                let (page, next) =
                    paginate(&self.prompts.list(), cursor(params), self.config.page_size);
                success(&id, page_result("prompts", page, next))
            }

            methods::TOOLS_CALL => self.handle_tools_call(&id, params, session_id).await,
            methods::PROMPTS_GET => self.handle_prompts_get(&id, params, session_id).await,
            methods::RESOURCES_READ => self.handle_resources_read(&id, params, session_id).await,

            methods::RESOURCES_SUBSCRIBE => self.handle_subscribe(&id, params, session_id, true),
            methods::RESOURCES_UNSUBSCRIBE => self.handle_subscribe(&id, params, session_id, false),

            methods::COMPLETION_COMPLETE => self.handle_completion(&id, params).await,

            methods::TASKS_LIST => {
                let (page, next) = self.tasks.list(cursor(params), self.config.page_size);
                success(&id, page_result("tasks", page, next))
            }
            methods::TASKS_GET => self.handle_tasks_get(&id, params),
            methods::TASKS_CANCEL => self.handle_tasks_cancel(&id, params),
            methods::TASKS_RESULT => self.handle_tasks_result(&id, params),

            other => fail_with(Some(&id), &McpError::method_not_found(other)),
        };

        (response, None)
    }

    fn handle_initialize(
        &self,
        id: &RequestId,
        params: Option<&Value>,
    ) -> (Value, Option<String>) {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let version = negotiate_version(requested);
        if requested != version {
            tracing::info!(requested, negotiated = version, "client offered an unsupported protocol version");
        }

        let client_info: ClientInfo = params
            .and_then(|p| p.get("clientInfo"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let client_capabilities: ClientCapabilities = params
            .and_then(|p| p.get("capabilities"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let Some(session_id) =
            self.sessions
                .create(client_info, version.to_string(), client_capabilities)
        else {
            return (
                fail_with(
                    Some(id),
                    &McpError::invalid_request("session limit reached"),
                ),
                None,
            );
        };
        tracing::info!(session_id = %session_id, version, "session initialized");

        let result = InitializeResult {
            protocol_version: version.to_string(),
            server_info: self.server_info.clone(),
            capabilities: self.capabilities.clone(),
            instructions: self.instructions.clone(),
        };
        (
            success(id, serde_json::to_value(result).unwrap_or_default()),
            Some(session_id),
        )
    }

    fn client_caps(&self, session_id: Option<&str>) -> ClientCapabilities {
        session_id
            .and_then(|sid| self.sessions.get(sid))
            .map(|s| s.client_capabilities)
            .unwrap_or_default()
    }

    /// Run a tool handler under its cancellation token, containing panics.
    async fn run_tool(
        &self,
        handler: ToolHandlerFn,
        args: Value,
        ctx: Arc<Context>,
        token: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let fut = AssertUnwindSafe(handler(args, ctx)).catch_unwind();
        tokio::select! {
            outcome = fut => match outcome {
                Ok(result) => result,
                Err(_panic) => Err(McpError::internal("tool handler panicked")),
            },
            () = token.cancelled() => Err(McpError::Cancelled),
        }
    }

    /// Finalize the task and build the response. The single funnel for
    /// every tool-call exit path.
    fn finalize_tool(&self, task_id: &str, id: &RequestId, outcome: Result<CallToolResult, McpError>) -> Value {
        match outcome {
            Ok(result) => {
                let value = serde_json::to_value(&result).unwrap_or_default();
                self.tasks.mark_completed(task_id, value.clone());
                success(id, value)
            }
            Err(McpError::Cancelled) => {
                self.tasks.mark_cancelled(task_id);
                fail_with(Some(id), &McpError::Cancelled)
            }
            Err(error) => {
                // Full detail stays here; the wire conversion sanitizes.
                tracing::error!(task_id = %task_id, error = %error, "tool call failed");
                let wire = JsonRpcError::from(&error);
                self.tasks.mark_failed(task_id, wire.clone());
                failure(Some(id), &wire)
            }
        }
    }

    async fn handle_tools_call(
        &self,
        id: &RequestId,
        params: Option<&Value>,
        session_id: Option<&str>,
    ) -> Value {
        let (name, args) = match parse_tool_call(params) {
            Ok(parsed) => parsed,
            Err(e) => return fail_with(Some(id), &e),
        };
        let Some(registered) = self.tools.get(&name) else {
            let message = unknown_tool_message(&name, &self.tools.names());
            return fail_with(
                Some(id),
                &McpError::invalid_params(methods::TOOLS_CALL, message),
            );
        };

        let task_id = self.tasks.create(id.clone(), &name);
        let token = CancellationToken::new();
        self.in_flight.insert(id.clone(), token.clone());
        self.tasks.mark_running(&task_id);

        let ctx = Arc::new(Context::new(
            id.clone(),
            session_id.map(String::from),
            self.client_caps(session_id),
            token.clone(),
            None,
        ));

        let outcome = self.run_tool(registered.handler, args, ctx, token).await;
        self.in_flight.remove(id);
        self.finalize_tool(&task_id, id, outcome)
    }

    /// Start a streamed tool call.
    ///
    /// The returned handle yields framed events: zero or more
    /// `server_request`/notification events while the tool runs, then the
    /// final response as a `message` event. Dropping the handle cancels the
    /// execution and discards its pending server requests.
    ///
    /// Gate failures and unknown tools come back as a ready error response
    /// instead of a stream.
    pub fn open_stream(
        self: &Arc<Self>,
        request: &Request,
        session_id: Option<&str>,
    ) -> Result<StreamHandle, Value> {
        let id = request.id.clone();

        if let Some(sid) = session_id {
            self.sessions.touch(sid);
        }
        if let Err(e) = self.gate(request, session_id) {
            tracing::warn!(method = %request.method(), error = %e, "streamed request rejected at the gate");
            return Err(fail_with(Some(&id), &e));
        }
        if request.method() != methods::TOOLS_CALL {
            return Err(fail_with(
                Some(&id),
                &McpError::invalid_request("only tools/call can be streamed"),
            ));
        }

        let (name, args) = match parse_tool_call(request.params.as_ref()) {
            Ok(parsed) => parsed,
            Err(e) => return Err(fail_with(Some(&id), &e)),
        };
        let Some(registered) = self.tools.get(&name) else {
            let message = unknown_tool_message(&name, &self.tools.names());
            return Err(fail_with(
                Some(&id),
                &McpError::invalid_params(methods::TOOLS_CALL, message),
            ));
        };

        let task_id = self.tasks.create(id.clone(), &name);
        let token = CancellationToken::new();
        self.in_flight.insert(id.clone(), token.clone());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(ClientBridge::new(
            events_tx.clone(),
            self.pending.clone(),
            self.config.bridge_timeout,
        ));
        let ctx = Arc::new(Context::new(
            id.clone(),
            session_id.map(String::from),
            self.client_caps(session_id),
            token.clone(),
            Some(bridge.clone()),
        ));

        let engine = Arc::clone(self);
        let call_bridge = bridge.clone();
        let call_token = token.clone();
        tokio::spawn(async move {
            engine.tasks.mark_running(&task_id);
            let outcome = engine
                .run_tool(registered.handler, args, ctx, call_token)
                .await;
            engine.in_flight.remove(&id);
            let response = engine.finalize_tool(&task_id, &id, outcome);
            let _ = events_tx.send(StreamEvent::Message(response));
            call_bridge.teardown();
        });

        Ok(StreamHandle::new(events_rx, token, bridge))
    }

    async fn handle_prompts_get(
        &self,
        id: &RequestId,
        params: Option<&Value>,
        session_id: Option<&str>,
    ) -> Value {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(methods::PROMPTS_GET, "missing prompt name"),
            );
        };
        let Some(renderer) = self.prompts.renderer(name) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(
                    methods::PROMPTS_GET,
                    format!("unknown prompt '{name}'"),
                ),
            );
        };
        let arguments = params
            .and_then(|p| p.get("arguments"))
            .and_then(Value::as_object)
            .cloned();

        let ctx = Arc::new(Context::new(
            id.clone(),
            session_id.map(String::from),
            self.client_caps(session_id),
            CancellationToken::new(),
            None,
        ));
        match renderer(arguments, ctx).await {
            Ok(result) => success(id, serde_json::to_value(result).unwrap_or_default()),
            Err(error) => {
                tracing::error!(prompt = %name, error = %error, "prompt render failed");
                fail_with(Some(id), &error)
            }
        }
    }

    async fn handle_resources_read(
        &self,
        id: &RequestId,
        params: Option<&Value>,
        session_id: Option<&str>,
    ) -> Value {
        let Some(uri) = params.and_then(|p| p.get("uri")).and_then(Value::as_str) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(methods::RESOURCES_READ, "missing uri"),
            );
        };
        let Some(reader) = self.resources.reader(uri) else {
            return fail_with(
                Some(id),
                &McpError::ResourceNotFound {
                    uri: uri.to_string(),
                },
            );
        };

        let ctx = Arc::new(Context::new(
            id.clone(),
            session_id.map(String::from),
            self.client_caps(session_id),
            CancellationToken::new(),
            None,
        ));
        match reader(uri.to_string(), ctx).await {
            Ok(contents) => success(
                id,
                serde_json::json!({ "contents": contents }),
            ),
            Err(error) => {
                tracing::error!(uri = %uri, error = %error, "resource read failed");
                fail_with(Some(id), &error)
            }
        }
    }

    fn handle_subscribe(
        &self,
        id: &RequestId,
        params: Option<&Value>,
        session_id: Option<&str>,
        subscribe: bool,
    ) -> Value {
        let method = if subscribe {
            methods::RESOURCES_SUBSCRIBE
        } else {
            methods::RESOURCES_UNSUBSCRIBE
        };
        let Some(uri) = params.and_then(|p| p.get("uri")).and_then(Value::as_str) else {
            return fail_with(Some(id), &McpError::invalid_params(method, "missing uri"));
        };
        let Some(sid) = session_id else {
            return fail_with(
                Some(id),
                &McpError::invalid_request("subscriptions require a session"),
            );
        };
        // The URI does not have to name an existing resource; it may come
        // to exist later.
        if subscribe {
            self.subscriptions.subscribe(sid, uri);
        } else {
            self.subscriptions.unsubscribe(sid, uri);
        }
        success(id, serde_json::json!({}))
    }

    async fn handle_completion(&self, id: &RequestId, params: Option<&Value>) -> Value {
        let reference = params.and_then(|p| p.get("ref"));
        let ref_type = reference
            .and_then(|r| r.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let ref_value = match ref_type {
            "ref/prompt" => reference.and_then(|r| r.get("name")).and_then(Value::as_str),
            "ref/resource" => reference.and_then(|r| r.get("uri")).and_then(Value::as_str),
            // Unknown reference types yield an empty result, not an error.
            _ => None,
        };

        let argument = params.and_then(|p| p.get("argument"));
        let arg_name = argument
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let arg_value = argument
            .and_then(|a| a.get("value"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let provider = ref_value.and_then(|v| self.completions.provider(ref_type, v));
        let result = match provider {
            None => CompleteResult::empty(),
            Some(provider) => match provider(arg_name, arg_value).await {
                Ok(values) => CompleteResult::from_values(values),
                Err(error) => {
                    tracing::error!(error = %error, "completion provider failed");
                    return fail_with(Some(id), &error);
                }
            },
        };
        success(id, serde_json::to_value(result).unwrap_or_default())
    }

    fn handle_tasks_get(&self, id: &RequestId, params: Option<&Value>) -> Value {
        let Some(task_id) = params.and_then(|p| p.get("taskId")).and_then(Value::as_str) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(methods::TASKS_GET, "missing taskId"),
            );
        };
        match self.tasks.get(task_id) {
            Some(task) => success(id, serde_json::to_value(task).unwrap_or_default()),
            None => fail_with(
                Some(id),
                &McpError::invalid_params(methods::TASKS_GET, format!("unknown task '{task_id}'")),
            ),
        }
    }

    fn handle_tasks_cancel(&self, id: &RequestId, params: Option<&Value>) -> Value {
        let Some(task_id) = params.and_then(|p| p.get("taskId")).and_then(Value::as_str) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(methods::TASKS_CANCEL, "missing taskId"),
            );
        };
        // Unknown and already-terminal tasks are a no-op: a client racing a
        // completion with a cancel must not see a protocol fault.
        let Some(task) = self.tasks.get(task_id) else {
            return success(id, serde_json::json!({ "cancelled": false }));
        };
        if task.status.is_terminal() {
            return success(id, serde_json::json!({ "cancelled": false }));
        }

        let signalled = self.in_flight.cancel(&task.request_id);
        if !signalled {
            // Nothing is executing; without an execution cleanup path the
            // registry finalizes the task directly.
            self.tasks.mark_cancelled(task_id);
        }
        success(id, serde_json::json!({ "cancelled": true }))
    }

    fn handle_tasks_result(&self, id: &RequestId, params: Option<&Value>) -> Value {
        let Some(task_id) = params.and_then(|p| p.get("taskId")).and_then(Value::as_str) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(methods::TASKS_RESULT, "missing taskId"),
            );
        };
        let Some(task) = self.tasks.get(task_id) else {
            return fail_with(
                Some(id),
                &McpError::invalid_params(
                    methods::TASKS_RESULT,
                    format!("unknown task '{task_id}'"),
                ),
            );
        };
        match task.status {
            TaskStatus::Completed => success(
                id,
                serde_json::json!({
                    "status": task.status,
                    "result": task.result,
                }),
            ),
            TaskStatus::Failed => {
                let error = task
                    .error
                    .unwrap_or_else(|| JsonRpcError::internal_error("task failed"));
                failure(Some(id), &error)
            }
            TaskStatus::Cancelled => fail_with(Some(id), &McpError::Cancelled),
            TaskStatus::Pending | TaskStatus::Running => fail_with(
                Some(id),
                &McpError::invalid_request(format!(
                    "task is not terminal (status: {})",
                    task.status
                )),
            ),
        }
    }

    // ------------------------------------------------------------------
    // Respond channel and lifecycle
    // ------------------------------------------------------------------

    /// Resolve a pending server-initiated request from a respond-channel
    /// payload: `{jsonrpc, id, result|error}`.
    pub fn resolve_response(&self, payload: &Value) -> Result<(), McpError> {
        let Some(obj) = payload.as_object() else {
            return Err(McpError::invalid_request("respond payload must be an object"));
        };
        let raw_id = obj
            .get("id")
            .cloned()
            .ok_or_else(|| McpError::invalid_request("respond payload is missing an id"))?;
        let id: RequestId = serde_json::from_value(raw_id)
            .map_err(|_| McpError::invalid_request("respond id must be a string or a number"))?;

        let outcome = if let Some(error) = obj.get("error") {
            Err(serde_json::from_value::<JsonRpcError>(error.clone())
                .map_err(|_| McpError::invalid_request("malformed error object"))?)
        } else {
            Ok(obj.get("result").cloned().unwrap_or(Value::Null))
        };

        if self.pending.resolve(&id, outcome) {
            Ok(())
        } else {
            Err(McpError::invalid_request(format!(
                "no pending request with id '{id}'"
            )))
        }
    }

    /// Terminate a session and cascade: subscriptions, rate bucket.
    /// Returns whether the session existed.
    pub fn terminate_session(&self, session_id: &str) -> bool {
        let existed = self.sessions.evict(session_id);
        if existed {
            self.cascade(session_id);
            tracing::info!(session_id = %session_id, "session terminated");
        }
        existed
    }

    fn cascade(&self, session_id: &str) {
        self.rate.cleanup(session_id);
        self.subscriptions.remove_session(session_id);
    }

    /// Evict idle sessions (cascading each) and drop stale rate buckets.
    pub fn sweep(&self) {
        for session_id in self.sessions.sweep(self.config.session_max_idle) {
            self.cascade(&session_id);
            tracing::info!(session_id = %session_id, "idle session evicted");
        }
        self.rate.cleanup_stale(self.config.rate_bucket_max_idle);
    }

    /// Spawn a background task sweeping on an interval.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                engine.sweep();
            }
        })
    }
}

fn cursor(params: Option<&Value>) -> Option<&str> {
    params.and_then(|p| p.get("cursor")).and_then(Value::as_str)
}

fn parse_tool_call(params: Option<&Value>) -> Result<(String, Value), McpError> {
    let params =
        params.ok_or_else(|| McpError::invalid_params(methods::TOOLS_CALL, "missing params"))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid_params(methods::TOOLS_CALL, "missing tool name"))?
        .to_string();
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    Ok((name, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;

    fn lenient_engine() -> Engine {
        EngineBuilder::new("test-server", "0.0.0")
            .config(EngineConfig::lenient())
            .build()
    }

    async fn request(engine: &Engine, body: Value, session: Option<&str>) -> Value {
        engine
            .handle_value(body, session)
            .await
            .response
            .expect("requests produce responses")
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let engine = lenient_engine();
        let dispatch = engine.handle_text("{not json", None).await;
        let response = dispatch.response.unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn non_object_payload_is_invalid_request() {
        let engine = lenient_engine();
        let dispatch = engine.handle_text("[1,2,3]", None).await;
        assert_eq!(dispatch.response.unwrap()["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let engine = lenient_engine();
        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"no/such/method"}),
            None,
        )
        .await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let engine = lenient_engine();
        let dispatch = engine
            .handle_value(
                serde_json::json!({"jsonrpc":"2.0","method":"notifications/initialized"}),
                None,
            )
            .await;
        assert!(dispatch.response.is_none());
    }

    #[tokio::test]
    async fn ping_always_succeeds() {
        let engine = EngineBuilder::new("strict", "0.0.0").build();
        assert!(engine.config().strict_sessions);
        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":7,"method":"ping"}),
            None,
        )
        .await;
        assert_eq!(response["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn strict_mode_rejects_sessionless_requests_without_side_effects() {
        let engine = EngineBuilder::new("strict", "0.0.0").build();
        engine.register_tool(Tool::new("t"), |_, _| async { Ok(CallToolResult::text("x")) });

        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/call",
                "params":{"name":"t","arguments":{}}}),
            None,
        )
        .await;
        assert_eq!(response["error"]["code"], -32600);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not initialized"));
        assert!(engine.tasks().is_empty());
        assert!(engine.in_flight().is_empty());
    }

    #[tokio::test]
    async fn initialize_creates_a_session_and_negotiates() {
        let engine = EngineBuilder::new("strict", "1.2.3").build();
        let dispatch = engine
            .handle_value(
                serde_json::json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{
                    "protocolVersion":"2025-06-18",
                    "clientInfo":{"name":"client","version":"0.1"},
                    "capabilities":{"sampling":{}}
                }}),
                None,
            )
            .await;
        let session = dispatch.new_session.expect("initialize creates a session");
        let response = dispatch.response.unwrap();
        assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(response["result"]["serverInfo"]["name"], "strict");

        let stored = engine.sessions().get(&session).unwrap();
        assert!(stored.client_capabilities.has_sampling());
        assert_eq!(stored.client_info.name, "client");
    }

    #[tokio::test]
    async fn oversized_arguments_are_rejected_before_the_handler() {
        let engine = EngineBuilder::new("limits", "0.0.0")
            .config(EngineConfig::lenient().size_limits(1024 * 1024, 3))
            .build();
        engine.register_tool(Tool::new("t"), |_, _| async { Ok(CallToolResult::text("x")) });

        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/call",
                "params":{"name":"t","arguments":{"a":1,"b":2,"c":3,"d":4}}}),
            None,
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        assert!(engine.tasks().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_requests_create_no_task() {
        let engine = EngineBuilder::new("limits", "0.0.0")
            .config(
                EngineConfig::default()
                    .strict_sessions(false)
                    .rate_limit(1, 0.000_1),
            )
            .build();
        engine.register_tool(Tool::new("t"), |_, _| async { Ok(CallToolResult::text("x")) });

        let call = serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/call",
            "params":{"name":"t","arguments":{}}});
        let first = request(&engine, call.clone(), Some("s")).await;
        assert!(first.get("result").is_some());

        let second = request(&engine, call, Some("s")).await;
        assert_eq!(second["error"]["code"], -32005);
        assert_eq!(engine.tasks().len(), 1);
    }

    #[tokio::test]
    async fn subscribe_tracks_membership_and_unknown_uris_succeed() {
        let engine = lenient_engine();
        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"resources/subscribe",
                "params":{"uri":"file:///not-yet-real.txt"}}),
            Some("sess"),
        )
        .await;
        assert!(response.get("result").is_some());
        assert!(engine.subscriptions().is_subscribed("sess", "file:///not-yet-real.txt"));
    }

    #[tokio::test]
    async fn completion_without_provider_is_empty_not_an_error() {
        let engine = lenient_engine();
        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"completion/complete",
                "params":{"ref":{"type":"ref/prompt","name":"nope"},
                          "argument":{"name":"a","value":"x"}}}),
            None,
        )
        .await;
        assert_eq!(response["result"]["completion"]["values"], serde_json::json!([]));

        // Unknown reference type: same leniency.
        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":2,"method":"completion/complete",
                "params":{"ref":{"type":"ref/martian","name":"x"},
                          "argument":{"name":"a","value":"x"}}}),
            None,
        )
        .await;
        assert_eq!(response["result"]["completion"]["values"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn registered_completion_provider_answers() {
        let engine = lenient_engine();
        engine.register_completion("ref/prompt", "greet", |_, value| async move {
            Ok(vec![format!("{value}ander"), format!("{value}na")])
        });
        let response = request(
            &engine,
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"completion/complete",
                "params":{"ref":{"type":"ref/prompt","name":"greet"},
                          "argument":{"name":"name","value":"alex"}}}),
            None,
        )
        .await;
        assert_eq!(
            response["result"]["completion"]["values"],
            serde_json::json!(["alexander", "alexna"])
        );
    }

    #[tokio::test]
    async fn session_termination_cascades() {
        let engine = EngineBuilder::new("strict", "0.0.0").build();
        let dispatch = engine
            .handle_value(
                serde_json::json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{
                    "protocolVersion":"2025-06-18"}}),
                None,
            )
            .await;
        let session = dispatch.new_session.unwrap();
        engine.subscriptions().subscribe(&session, "file:///a");

        assert!(engine.terminate_session(&session));
        assert!(engine.sessions().get(&session).is_none());
        assert!(engine.subscriptions().subscribers("file:///a").is_empty());
        // Idempotent.
        assert!(!engine.terminate_session(&session));
    }

    #[tokio::test]
    async fn respond_channel_unknown_id_is_an_error() {
        let engine = lenient_engine();
        let err = engine
            .resolve_response(&serde_json::json!({"jsonrpc":"2.0","id":"ghost","result":{}}))
            .unwrap_err();
        assert!(err.to_string().contains("no pending request"), "{err}");
    }
}
