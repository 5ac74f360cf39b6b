//! JSON-RPC 2.0 protocol types for MCP.
//!
//! Outbound traffic is always a [`JsonRpcRequest`] or [`JsonRpcNotification`];
//! inbound traffic is classified into an [`IncomingMessage`] once the framing
//! codec has produced a complete JSON value.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::error::{McpError, Result};

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version announced during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names used by the client.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Sent after a successful handshake.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Tool discovery.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation.
    pub const TOOLS_CALL: &str = "tools/call";
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON-RPC Base Types
// ─────────────────────────────────────────────────────────────────────────────

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID for correlating responses.
    pub id: u64,
    /// Method name to call.
    pub method: String,
    /// Method parameters (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0").
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Request ID this response is for.
    pub id: u64,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Get the result, or return an error if this is an error response.
    pub fn into_result(self) -> std::result::Result<Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code; servers that omit it are treated as an internal error.
    #[serde(default = "default_error_code")]
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes
impl JsonRpcError {
    /// Parse error - Invalid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid Request - Not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        McpError::server_error(err.code, err.message, err.data)
    }
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

fn default_error_code() -> i64 {
    JsonRpcError::INTERNAL_ERROR
}

/// Rewrite a bare string `error` into a proper error object.
fn normalize_error(mut value: Value) -> Value {
    if let Some(error) = value.get_mut("error")
        && let Some(message) = error.as_str().map(str::to_owned)
    {
        *error = json!({ "code": JsonRpcError::INTERNAL_ERROR, "message": message });
    }
    value
}

/// A decoded message from the server, classified by shape.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Carries an id plus `result` or `error`.
    Response(JsonRpcResponse),
    /// Carries a method and no id.
    Notification(JsonRpcNotification),
    /// Server-to-client request (method and id).
    Request {
        /// Request id as sent by the server.
        id: Value,
        /// Requested method.
        method: String,
    },
    /// Carries one of our ids but could not be decoded as a response.
    MalformedResponse {
        /// Id of the request it answers.
        id: u64,
        /// Why decoding failed.
        reason: String,
    },
}

impl IncomingMessage {
    /// Classify a decoded JSON value.
    ///
    /// Responses whose id is not an unsigned integer cannot belong to this
    /// client and are reported as protocol errors. A response with a usable
    /// id that fails to decode is still returned, as
    /// [`IncomingMessage::MalformedResponse`], so its caller can be settled.
    pub fn classify(value: Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(McpError::protocol("message is not a JSON object"));
        };

        let method = obj.get("method").and_then(Value::as_str).map(str::to_owned);
        let id = obj.get("id").filter(|id| !id.is_null()).cloned();
        let is_response = obj.contains_key("result") || obj.contains_key("error");

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request { id, method }),
            (Some(_), None) => Ok(Self::Notification(serde_json::from_value(value)?)),
            (None, Some(Value::Number(id))) if is_response && id.is_u64() => {
                let id = id.as_u64().unwrap_or_default();
                match serde_json::from_value(normalize_error(value)) {
                    Ok(response) => Ok(Self::Response(response)),
                    Err(e) => Ok(Self::MalformedResponse {
                        id,
                        reason: e.to_string(),
                    }),
                }
            }
            (None, id) if is_response => Err(McpError::protocol(format!(
                "response with unusable id: {}",
                id.unwrap_or(Value::Null)
            ))),
            _ => Err(McpError::protocol(
                "message is neither a response nor a notification",
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Protocol Types
// ─────────────────────────────────────────────────────────────────────────────

/// Client capabilities sent during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Tools capability announcement.
    pub tools: Value,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self { tools: json!({}) }
    }
}

/// Client info sent during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version.
    pub protocol_version: String,
    /// Client capabilities.
    pub capabilities: ClientCapabilities,
    /// Client info.
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Build initialize params for the given client identity.
    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info,
        }
    }
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self::new(ClientInfo::default())
    }
}

/// Server capabilities returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Resources capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    /// Prompts capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    /// Logging capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

/// Tools capability details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server info returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Server version.
    #[serde(default)]
    pub version: String,
}

/// Result of the initialize request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version the server speaks.
    #[serde(default)]
    pub protocol_version: String,
    /// Server capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server info.
    #[serde(default)]
    pub server_info: ServerInfo,
}

/// A tool advertised by the server.
///
/// Missing or null `description` and `inputSchema` fields default to an
/// empty string and an empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(default = "empty_object", deserialize_with = "null_as_empty_object")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty description and schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: empty_object(),
        }
    }

    /// Normalize one raw `tools/list` entry.
    ///
    /// Returns `None` when the entry has no usable name. A description that
    /// is not a string becomes empty, and a null or missing schema becomes `{}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            description: value
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema: value
                .get("inputSchema")
                .filter(|schema| !schema.is_null())
                .cloned()
                .unwrap_or_else(empty_object),
        })
    }
}

fn empty_object() -> Value {
    json!({})
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_tools<'de, D>(deserializer: D) -> std::result::Result<Vec<ToolDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let tool = ToolDescriptor::from_value(entry);
            if tool.is_none() {
                tracing::warn!(entry = %entry, "skipping tool without a usable name");
            }
            tool
        })
        .collect())
}

fn null_as_empty_object<'de, D>(deserializer: D) -> std::result::Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .filter(|v| !v.is_null())
        .unwrap_or_else(empty_object))
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// List of available tools. Entries without a usable name are skipped.
    #[serde(default, deserialize_with = "lenient_tools")]
    pub tools: Vec<ToolDescriptor>,
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments to pass to the tool.
    pub arguments: Value,
}

/// Normalized result of a tool invocation.
///
/// Content items are kept as opaque JSON. Local failures are folded into the
/// same shape via [`CallToolResult::error`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<Value>,
    /// Whether the tool call resulted in an error.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Synthesize an error result carrying a single text item.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": message.into() })],
            is_error: true,
        }
    }

    /// Joined text of all `text` content items.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check if the tool call was an error.
    pub fn is_error(&self) -> bool {
        self.is_error
    }
}
