//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to locate or spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// The `initialize` handshake was rejected or timed out.
    #[error("MCP initialization failed: {0}")]
    Initialization(String),

    /// A request exceeded its deadline.
    #[error("request {id} timed out after {elapsed:?}")]
    Timeout {
        /// Id of the request that timed out.
        id: u64,
        /// How long the request waited.
        elapsed: Duration,
    },

    /// Malformed frame or unexpected message shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The child process exited while the request was outstanding.
    #[error("MCP server process exited")]
    ProcessExited,

    /// The client was disconnected while the request was outstanding.
    #[error("client disconnected")]
    Disconnected,

    /// No live server process to send to.
    #[error("not connected to MCP server")]
    NotConnected,

    /// Writing a frame to the server's stdin failed.
    #[error("failed to write to MCP server: {0}")]
    Write(#[source] std::io::Error),

    /// Server returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create an initialization error.
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether this error came from the child process going away.
    pub fn is_process_exit(&self) -> bool {
        matches!(self, Self::ProcessExited)
    }

    /// Whether this error is a per-request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
