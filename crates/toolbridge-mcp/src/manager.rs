//! Lifecycle management for several MCP servers.
//!
//! The [`McpManager`] holds one long-lived [`McpClient`] per configured
//! server and fans connection, discovery and shutdown out across them.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolbridge_mcp::{ClientConfig, McpManager};
//!
//! let config = ClientConfig::load(&path)?;
//! let manager = McpManager::from_config(&config);
//!
//! let connected = manager.connect_all().await;
//! println!("{connected} servers up, {} tools", manager.all_tools().len());
//!
//! let result = manager.call_tool("firestore", "list_collections", json!({})).await;
//! manager.disconnect_all();
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::client::McpClient;
use crate::config::{ClientConfig, McpServerConfig};
use crate::error::{McpError, Result};
use crate::protocol::{CallToolResult, ClientInfo, ToolDescriptor};

/// Manager for multiple MCP server connections.
#[derive(Default)]
pub struct McpManager {
    client_info: ClientInfo,
    clients: BTreeMap<String, Arc<McpClient>>,
}

impl McpManager {
    /// Create a new empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with the given server configurations.
    pub fn with_configs(configs: Vec<McpServerConfig>) -> Self {
        let mut manager = Self::new();
        for config in configs {
            manager.add_server(config);
        }
        manager
    }

    /// Create a manager from a loaded config file.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut manager = Self {
            client_info: config.client_info(),
            clients: BTreeMap::new(),
        };
        for server in &config.servers {
            manager.add_server(server.clone());
        }
        manager
    }

    /// Add a server; nothing is spawned until it is connected.
    ///
    /// A server with the same name is replaced and its process killed.
    pub fn add_server(&mut self, config: McpServerConfig) {
        let name = config.name.clone();
        tracing::debug!(server = %name, "adding MCP server configuration");
        let client = McpClient::with_client_info(config, self.client_info.clone());
        if let Some(previous) = self.clients.insert(name, Arc::new(client)) {
            previous.disconnect();
        }
    }

    /// Remove a server by name, disconnecting it first.
    pub fn remove_server(&mut self, name: &str) -> bool {
        match self.clients.remove(name) {
            Some(client) => {
                client.disconnect();
                tracing::debug!(server = %name, "removed MCP server configuration");
                true
            }
            None => false,
        }
    }

    /// Names of all configured servers, sorted.
    pub fn server_names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    /// Names of servers with a live connection.
    pub fn connected_server_names(&self) -> Vec<&str> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_connected())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Check if a server is configured.
    pub fn has_server(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Check if a server is connected.
    pub fn is_connected(&self, name: &str) -> bool {
        self.clients.get(name).is_some_and(|c| c.is_connected())
    }

    /// Get a client by name.
    pub fn get_client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.clients.get(name).cloned()
    }

    /// Connect every configured server concurrently.
    ///
    /// Failures are logged and skipped. Returns how many are connected.
    pub async fn connect_all(&self) -> usize {
        let mut tasks = JoinSet::new();
        for client in self.clients.values() {
            let client = Arc::clone(client);
            tasks.spawn(async move { client.connect().await });
        }

        let mut connected = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => connected += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "MCP connect task failed"),
            }
        }

        tracing::info!(
            connected,
            total = self.clients.len(),
            "MCP server connection complete"
        );
        connected
    }

    /// Connect a single server by name.
    pub async fn connect_server(&self, name: &str) -> Result<()> {
        let client = self
            .clients
            .get(name)
            .ok_or_else(|| McpError::config(format!("server '{name}' not configured")))?;
        client.try_connect().await
    }

    /// Cached tools of every server as `(server, tool)` pairs.
    pub fn all_tools(&self) -> Vec<(String, ToolDescriptor)> {
        self.clients
            .iter()
            .flat_map(|(name, client)| {
                client
                    .get_tools()
                    .into_iter()
                    .map(move |tool| (name.clone(), tool))
            })
            .collect()
    }

    /// First server (by name) whose cache holds `tool`.
    pub fn find_tool(&self, tool: &str) -> Option<&str> {
        self.clients
            .iter()
            .find(|(_, client)| client.has_tool(tool))
            .map(|(name, _)| name.as_str())
    }

    /// Total number of cached tools across all servers.
    pub fn tool_count(&self) -> usize {
        self.clients.values().map(|c| c.get_tools().len()).sum()
    }

    /// Call a tool on a named server.
    pub async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> CallToolResult {
        match self.clients.get(server) {
            Some(client) => client.call_tool(tool, arguments).await,
            None => CallToolResult::error(format!("MCP server '{server}' is not configured")),
        }
    }

    /// Disconnect every server. Configurations are kept for reconnection.
    pub fn disconnect_all(&self) {
        tracing::info!(server_count = self.clients.len(), "disconnecting all MCP servers");
        for client in self.clients.values() {
            client.disconnect();
        }
    }

    /// Number of configured servers.
    pub fn config_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of connected servers.
    pub fn connected_count(&self) -> usize {
        self.clients.values().filter(|c| c.is_connected()).count()
    }

    /// Check if any servers are connected.
    pub fn has_connections(&self) -> bool {
        self.clients.values().any(|c| c.is_connected())
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("configured", &self.server_names())
            .field("connected", &self.connected_server_names())
            .finish()
    }
}
