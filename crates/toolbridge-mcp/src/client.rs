//! MCP client for a single stdio server.
//!
//! [`McpClient`] owns the whole connection: the child process, the in-flight
//! request table, and the tool cache. It moves through
//! `Disconnected → Connecting → Connected` on [`McpClient::connect`] and
//! falls back to `Disconnected` on [`McpClient::disconnect`] or when the
//! process exits. Connection failures never escape as errors from the
//! high-level API; callers just see no tools.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::codec::FrameWriter;
use crate::config::McpServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcNotification, JsonRpcResponse, ListToolsResult, ServerInfo,
    ToolDescriptor, methods,
};
use crate::registry::ToolRegistry;
use crate::transport::{StdioProcess, TransportEvents};

/// Buffered server notifications per subscriber before old ones are dropped.
const NOTIFICATION_CAPACITY: usize = 64;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No process is held.
    #[default]
    Disconnected,
    /// A process was spawned and the handshake is in progress.
    Connecting,
    /// Handshake done and the process is running.
    Connected,
}

/// State shared between the client and its process's supervisor task.
struct Shared {
    config: McpServerConfig,
    executable: Option<PathBuf>,
    client_info: ClientInfo,
    state: Mutex<ConnectionState>,
    process: Mutex<Option<StdioProcess>>,
    /// Bumped on every spawn and teardown; exit events from older
    /// generations are ignored.
    generation: AtomicU64,
    dispatcher: Dispatcher,
    tools: ToolRegistry,
    init: Mutex<Option<InitializeResult>>,
    notifications: broadcast::Sender<JsonRpcNotification>,
}

impl Shared {
    fn name(&self) -> &str {
        &self.config.name
    }

    /// Writer of the running process, tagged with the current dispatcher
    /// epoch. The epoch is read first so a teardown after this call refuses
    /// any request made through the link.
    fn live_link(&self) -> Option<Link> {
        let epoch = self.dispatcher.epoch();
        self.process
            .lock()
            .as_ref()
            .filter(|process| process.is_alive())
            .map(|process| Link {
                epoch,
                writer: process.writer(),
            })
    }

    async fn request(
        &self,
        link: &Link,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse> {
        self.dispatcher
            .request_in(link.epoch, &link.writer, method, params)
            .await
    }

    fn handle_message(&self, message: Value) {
        match IncomingMessage::classify(message) {
            Ok(IncomingMessage::Response(response)) => {
                self.dispatcher.complete(response);
            }
            Ok(IncomingMessage::Notification(notification)) => {
                tracing::debug!(
                    server = %self.name(),
                    method = %notification.method,
                    "MCP notification"
                );
                // No subscribers is fine.
                let _ = self.notifications.send(notification);
            }
            Ok(IncomingMessage::Request { id, method }) => {
                tracing::debug!(
                    server = %self.name(),
                    %id,
                    method = %method,
                    "ignoring server-initiated request"
                );
            }
            Ok(IncomingMessage::MalformedResponse { id, reason }) => {
                tracing::warn!(server = %self.name(), id, %reason, "malformed MCP response");
                self.dispatcher
                    .fail(id, McpError::protocol(format!("malformed response: {reason}")));
            }
            Err(e) => {
                tracing::warn!(server = %self.name(), error = %e, "dropping unrecognized MCP message");
            }
        }
    }

    fn handle_exit(&self, generation: u64, status: Option<ExitStatus>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(server = %self.name(), "ignoring exit of superseded MCP server process");
            return;
        }

        let process = self.process.lock().take();
        *self.state.lock() = ConnectionState::Disconnected;
        self.tools.clear();
        *self.init.lock() = None;
        let rejected = self.dispatcher.fail_all(|| McpError::ProcessExited);
        drop(process);

        tracing::warn!(
            server = %self.name(),
            code = status.and_then(|s| s.code()),
            rejected,
            "MCP server exited, connection reset"
        );
    }

    /// Kill any process, reset state, and reject in-flight requests.
    fn teardown(&self, reason: impl Fn() -> McpError) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let process = self.process.lock().take();
        if let Some(process) = &process {
            process.kill();
        }
        *self.state.lock() = ConnectionState::Disconnected;
        self.tools.clear();
        *self.init.lock() = None;
        self.dispatcher.fail_all(reason)
    }

    async fn initialize(&self, link: &Link) -> Result<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::new(self.client_info.clone()))?;
        let response = self
            .request(link, methods::INITIALIZE, Some(params))
            .await?;
        let result = match response.result {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => InitializeResult::default(),
        };
        self.dispatcher
            .notify(&link.writer, methods::INITIALIZED, None)
            .await?;
        Ok(result)
    }

    async fn refresh_tools(&self, link: &Link) -> Result<Vec<ToolDescriptor>> {
        let response = self
            .request(link, methods::TOOLS_LIST, Some(json!({})))
            .await?;
        let listed: ListToolsResult = match response.result {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => ListToolsResult::default(),
        };

        self.tools.replace(listed.tools);
        let tools = self.tools.list();
        tracing::debug!(server = %self.name(), tool_count = tools.len(), "listed MCP tools");
        Ok(tools)
    }
}

/// A writer bound to the dispatcher epoch it was obtained in.
struct Link {
    epoch: u64,
    writer: Arc<FrameWriter>,
}

/// Routes a supervised process's events back to the client that spawned it.
struct ProcessEvents {
    shared: Weak<Shared>,
    generation: u64,
}

impl TransportEvents for ProcessEvents {
    fn on_message(&self, message: Value) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_message(message);
        }
    }

    fn on_exit(&self, status: Option<ExitStatus>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_exit(self.generation, status);
        }
    }
}

/// An MCP client connected (or connectable) to a single MCP server.
///
/// Construct one per server at startup and hand out references; dropping it
/// kills the server process.
pub struct McpClient {
    shared: Arc<Shared>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl McpClient {
    /// Create a disconnected client. The executable is resolved now.
    pub fn new(config: McpServerConfig) -> Self {
        Self::with_client_info(config, ClientInfo::default())
    }

    /// Create a disconnected client announcing a specific identity.
    pub fn with_client_info(config: McpServerConfig, client_info: ClientInfo) -> Self {
        let executable = config.resolve_executable();
        let dispatcher = Dispatcher::new(config.request_timeout());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                executable,
                client_info,
                state: Mutex::new(ConnectionState::Disconnected),
                process: Mutex::new(None),
                generation: AtomicU64::new(0),
                dispatcher,
                tools: ToolRegistry::new(),
                init: Mutex::new(None),
                notifications,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &McpServerConfig {
        &self.shared.config
    }

    /// The executable chosen from the candidate list.
    pub fn executable(&self) -> Option<&Path> {
        self.shared.executable.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// True iff connected and the server process is still running.
    pub fn is_connected(&self) -> bool {
        let connected = *self.shared.state.lock() == ConnectionState::Connected;
        connected
            && self
                .shared
                .process
                .lock()
                .as_ref()
                .is_some_and(StdioProcess::is_alive)
    }

    /// Server info from the last successful handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.shared.init.lock().as_ref().map(|init| init.server_info.clone())
    }

    /// Full `initialize` result from the last successful handshake.
    pub fn initialize_result(&self) -> Option<InitializeResult> {
        self.shared.init.lock().clone()
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.dispatcher.pending_count()
    }

    /// Receive notifications sent by the server from now on.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.shared.notifications.subscribe()
    }

    /// Connect if needed; returns whether the client is connected afterwards.
    ///
    /// Failures are logged, never returned.
    pub async fn connect(&self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(server = %self.name(), error = %e, "failed to connect to MCP server");
                false
            }
        }
    }

    /// Connect if needed, reporting why a connection could not be made.
    ///
    /// Spawns the server, performs the `initialize` handshake, and discovers
    /// tools. On failure the spawned process is killed and the client is left
    /// `Disconnected`.
    pub async fn try_connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        if self.shared.process.lock().is_some() {
            tracing::info!(server = %self.name(), "clearing stale MCP server process");
            self.shared.teardown(|| McpError::ProcessExited);
        }

        *self.shared.state.lock() = ConnectionState::Connecting;
        let result = self.establish().await;
        if result.is_err() {
            self.shared.teardown(|| McpError::Disconnected);
        }
        result
    }

    async fn establish(&self) -> Result<()> {
        let shared = &self.shared;
        let executable = shared.executable.clone().ok_or_else(|| {
            McpError::spawn_failed(format!("no executable configured for '{}'", self.name()))
        })?;

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let events = Arc::new(ProcessEvents {
            shared: Arc::downgrade(shared),
            generation,
        });
        let process = StdioProcess::spawn(&shared.config, &executable, events)?;
        *shared.process.lock() = Some(process);
        let Some(link) = shared.live_link() else {
            return Err(McpError::initialization("server exited during startup"));
        };

        let init = shared
            .initialize(&link)
            .await
            .map_err(|e| McpError::initialization(e.to_string()))?;
        tracing::info!(
            server = %self.name(),
            remote = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server initialized"
        );
        *shared.init.lock() = Some(init);

        let tool_count = match shared.refresh_tools(&link).await {
            Ok(tools) => tools.len(),
            Err(e) => {
                tracing::warn!(server = %self.name(), error = %e, "tool discovery failed during connect");
                0
            }
        };

        let mut state = shared.state.lock();
        if shared.generation.load(Ordering::SeqCst) != generation {
            return Err(McpError::Disconnected);
        }
        let alive = shared
            .process
            .lock()
            .as_ref()
            .is_some_and(StdioProcess::is_alive);
        if !alive {
            return Err(McpError::ProcessExited);
        }
        *state = ConnectionState::Connected;
        drop(state);

        tracing::info!(server = %self.name(), tool_count, "connected to MCP server");
        Ok(())
    }

    async fn ensure_connected(&self) -> bool {
        self.is_connected() || self.connect().await
    }

    /// Send a raw JSON-RPC request on the live connection.
    ///
    /// Does not connect on demand; returns [`McpError::NotConnected`] instead.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        let link = self.shared.live_link().ok_or(McpError::NotConnected)?;
        self.shared.request(&link, method, params).await
    }

    /// Re-list the server's tools, replacing the cache.
    ///
    /// Connects first if needed. Returns an empty list on any failure.
    pub async fn discover_tools(&self) -> Vec<ToolDescriptor> {
        if !self.ensure_connected().await {
            return Vec::new();
        }
        let Some(link) = self.shared.live_link() else {
            return Vec::new();
        };
        match self.shared.refresh_tools(&link).await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(server = %self.name(), error = %e, "failed to list MCP tools");
                Vec::new()
            }
        }
    }

    /// Call a tool on the server.
    ///
    /// Every failure, local or remote, comes back as a result with
    /// `is_error` set and a text item describing what went wrong.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> CallToolResult {
        if !self.ensure_connected().await {
            return CallToolResult::error(format!(
                "MCP server '{}' is not connected",
                self.name()
            ));
        }

        match self.try_call_tool(name, arguments).await {
            Ok(result) => {
                if result.is_error() {
                    tracing::warn!(server = %self.name(), tool = %name, "tool call returned error");
                } else {
                    tracing::debug!(server = %self.name(), tool = %name, "tool call succeeded");
                }
                result
            }
            Err(e) => {
                tracing::warn!(server = %self.name(), tool = %name, error = %e, "tool call failed");
                CallToolResult::error(format!("Error calling tool '{name}': {e}"))
            }
        }
    }

    async fn try_call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let response = self.request(methods::TOOLS_CALL, Some(params)).await?;
        match response.result {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value)?),
            _ => Ok(CallToolResult::default()),
        }
    }

    /// Cached tools from the last discovery, sorted by name.
    pub fn get_tools(&self) -> Vec<ToolDescriptor> {
        self.shared.tools.list()
    }

    /// Look up a cached tool.
    pub fn get_tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.shared.tools.get(name)
    }

    /// Whether the cache holds a tool with this name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.shared.tools.contains(name)
    }

    /// Kill the server, clear cached state, and reject pending requests.
    ///
    /// Safe to call any number of times.
    pub fn disconnect(&self) {
        let had_process = self.shared.process.lock().is_some();
        let rejected = self.shared.teardown(|| McpError::Disconnected);
        if had_process || rejected > 0 {
            tracing::info!(server = %self.name(), rejected, "disconnected from MCP server");
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("tools", &self.shared.tools.len())
            .field("pending", &self.pending_requests())
            .finish()
    }
}
