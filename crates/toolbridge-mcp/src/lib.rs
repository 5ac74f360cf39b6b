//! Stdio MCP (Model Context Protocol) client.
//!
//! This crate spawns MCP servers as child processes, speaks JSON-RPC 2.0 to
//! them over stdin/stdout, discovers their tools and invokes them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - Connection lifecycle (Disconnected/Connecting/Connected) │
//! │  - initialize, tools/list, tools/call; tool cache           │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                 ▲
//!            ▼                                 │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │  Dispatcher              │   │  StdioProcess                │
//! │  - id allocation         │◄──│  - spawn + supervise child   │
//! │  - pending table, timers │   │  - stderr to log, exit event │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                                              │
//!                                              ▼
//!                               ┌──────────────────────────────┐
//!                               │  codec                       │
//!                               │  - Content-Length framing    │
//!                               │  - newline-delimited fallback│
//!                               └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use toolbridge_mcp::{McpClient, McpServerConfig};
//!
//! let config = McpServerConfig::new("firestore", "./mcp/dist/index.js")
//!     .with_command("node")
//!     .with_env_var("PROJECT_ID", "demo");
//!
//! let client = McpClient::new(config);
//! if client.connect().await {
//!     for tool in client.get_tools() {
//!         println!("{} - {}", tool.name, tool.description);
//!     }
//!     let result = client.call_tool("echo", json!({"text": "hi"})).await;
//!     println!("{}", result.text());
//! }
//! client.disconnect();
//! ```
//!
//! # Wire format
//!
//! Outbound messages always use Content-Length framing:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! Inbound, the decoder also accepts one JSON message per line, for servers
//! that write newline-delimited output.

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use client::{ConnectionState, McpClient};
pub use codec::{FrameDecoder, FrameWriter, FramingMode};
pub use config::{ClientConfig, ENABLE_ALL_TOOLS_VAR, McpServerConfig};
pub use dispatcher::{DEFAULT_REQUEST_TIMEOUT, Dispatcher};
pub use error::{McpError, Result};
pub use manager::McpManager;
pub use protocol::{
    CallToolParams, CallToolResult, ClientInfo, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerCapabilities, ServerInfo, ToolDescriptor, ToolsCapability,
};
pub use registry::ToolRegistry;
pub use transport::{StdioProcess, TransportEvents};
