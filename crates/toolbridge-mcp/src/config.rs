//! Server and client configuration.
//!
//! Configuration is plain data: it can be built in code with the builder
//! methods or loaded from a TOML file such as
//!
//! ```toml
//! client_name = "studio-assistant"
//!
//! [[servers]]
//! name = "firestore"
//! command = "node"
//! candidates = ["./mcp/dist/index.js", "/opt/mcp/dist/index.js"]
//! request_timeout_ms = 30000
//!
//! [servers.env]
//! PROJECT_ID = "demo-project"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatcher::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{McpError, Result};
use crate::protocol::ClientInfo;

/// Environment variable that asks the server to expose every tool.
pub const ENABLE_ALL_TOOLS_VAR: &str = "ENABLE_ALL_TOOLS";

/// Configuration for one stdio MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique name for this server.
    pub name: String,
    /// Interpreter to run the resolved path with (e.g. `node`). When unset,
    /// the resolved path is executed directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Candidate locations of the executable or script, probed in order.
    #[serde(default)]
    pub candidates: Vec<PathBuf>,
    /// Extra arguments after the resolved path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables merged over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Inject `ENABLE_ALL_TOOLS=true` unless the variable is already set.
    #[serde(default = "default_enable_all_tools")]
    pub enable_all_tools: bool,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

fn default_enable_all_tools() -> bool {
    true
}

impl McpServerConfig {
    /// Create a config that runs `executable` directly.
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: None,
            candidates: vec![executable.into()],
            args: Vec::new(),
            env: BTreeMap::new(),
            request_timeout_ms: default_request_timeout_ms(),
            enable_all_tools: true,
        }
    }

    /// Run the resolved path through an interpreter.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Append another candidate location.
    pub fn with_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(path.into());
        self
    }

    /// Replace the candidate list.
    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Add arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Toggle the `ENABLE_ALL_TOOLS` default.
    pub fn with_enable_all_tools(mut self, enabled: bool) -> Self {
        self.enable_all_tools = enabled;
        self
    }

    /// The per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Pick the executable to spawn.
    ///
    /// The first candidate that exists on disk wins. If none exists the first
    /// candidate is returned unchanged so that bare command names still go
    /// through `PATH` lookup at spawn time.
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .find(|candidate| candidate.exists())
            .or_else(|| self.candidates.first())
            .cloned()
    }

    /// Variables to set on the child on top of the inherited environment.
    pub fn effective_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        if self.enable_all_tools
            && !env.contains_key(ENABLE_ALL_TOOLS_VAR)
            && std::env::var_os(ENABLE_ALL_TOOLS_VAR).is_none()
        {
            env.insert(ENABLE_ALL_TOOLS_VAR.to_string(), "true".to_string());
        }
        env
    }
}

/// Top-level configuration: the client identity plus its servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name announced in `clientInfo` (defaults to `toolbridge`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Configured servers.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl ClientConfig {
    /// Default location: `<config dir>/toolbridge/servers.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("toolbridge").join("servers.toml"))
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            McpError::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            servers = config.servers.len(),
            "loaded MCP config"
        );
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| McpError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check names are present and unique and every server can be located.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(McpError::config("server with empty name"));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(McpError::config(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
            if server.candidates.is_empty() {
                return Err(McpError::config(format!(
                    "server '{}' has no candidate paths",
                    server.name
                )));
            }
        }
        Ok(())
    }

    /// Find a server by name.
    pub fn server(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Identity sent during `initialize`.
    pub fn client_info(&self) -> ClientInfo {
        let mut info = ClientInfo::default();
        if let Some(name) = &self.client_name {
            info.name = name.clone();
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_server_config_builder() {
        let config = McpServerConfig::new("test", "mcp-server-test")
            .with_command("node")
            .with_candidate("/opt/mcp/index.js")
            .with_arg("--stdio")
            .with_env_var("DEBUG", "1")
            .with_timeout(Duration::from_millis(1500));

        assert_eq!(config.name, "test");
        assert_eq!(config.command.as_deref(), Some("node"));
        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.args, vec!["--stdio"]);
        assert_eq!(config.env.get("DEBUG").map(String::as_str), Some("1"));
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_resolve_prefers_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("server.js");
        std::fs::write(&present, "// stub").unwrap();

        let config = McpServerConfig::new("s", dir.path().join("missing.js"))
            .with_candidate(&present)
            .with_candidate(dir.path().join("also-missing.js"));
        assert_eq!(config.resolve_executable(), Some(present));
    }

    #[test]
    fn test_resolve_falls_back_to_first_candidate() {
        let config = McpServerConfig::new("s", "some-binary-on-path").with_candidate("/nope/x");
        assert_eq!(
            config.resolve_executable(),
            Some(PathBuf::from("some-binary-on-path"))
        );

        let empty = McpServerConfig::new("s", "x").with_candidates(Vec::new());
        assert_eq!(empty.resolve_executable(), None);
    }

    #[test]
    fn test_effective_env_defaults() {
        let config = McpServerConfig::new("s", "x").with_env_var("PROJECT_ID", "p1");
        let env = config.effective_env();
        assert_eq!(env.get("PROJECT_ID").map(String::as_str), Some("p1"));
        if std::env::var_os(ENABLE_ALL_TOOLS_VAR).is_none() {
            assert_eq!(env.get(ENABLE_ALL_TOOLS_VAR).map(String::as_str), Some("true"));
        }

        let overridden = McpServerConfig::new("s", "x").with_env_var(ENABLE_ALL_TOOLS_VAR, "false");
        assert_eq!(
            overridden.effective_env().get(ENABLE_ALL_TOOLS_VAR).map(String::as_str),
            Some("false")
        );

        let disabled = McpServerConfig::new("s", "x").with_enable_all_tools(false);
        assert!(!disabled.effective_env().contains_key(ENABLE_ALL_TOOLS_VAR));
    }

    #[test]
    fn test_parse_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            client_name = "studio"

            [[servers]]
            name = "firestore"
            command = "node"
            candidates = ["./dist/index.js", "/opt/dist/index.js"]

            [servers.env]
            PROJECT_ID = "demo"

            [[servers]]
            name = "local"
            candidates = ["mcp-local"]
            request_timeout_ms = 500
            enable_all_tools = false
            "#,
        )
        .unwrap();

        assert_eq!(config.client_info().name, "studio");
        assert_eq!(config.servers.len(), 2);

        let firestore = config.server("firestore").unwrap();
        assert_eq!(firestore.command.as_deref(), Some("node"));
        assert_eq!(firestore.request_timeout(), Duration::from_secs(30));
        assert!(firestore.enable_all_tools);

        let local = config.server("local").unwrap();
        assert_eq!(local.request_timeout(), Duration::from_millis(500));
        assert!(!local.enable_all_tools);
    }

    #[test]
    fn test_validation_errors() {
        let dup = r#"
            [[servers]]
            name = "a"
            candidates = ["x"]
            [[servers]]
            name = "a"
            candidates = ["y"]
        "#;
        let err = ClientConfig::from_toml_str(dup).unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let no_candidates = r#"
            [[servers]]
            name = "a"
        "#;
        let err = ClientConfig::from_toml_str(no_candidates).unwrap_err();
        assert!(err.to_string().contains("no candidate"));

        let err = ClientConfig::from_toml_str("servers = 3").unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[servers]]\nname = \"s\"\ncandidates = [\"cat\"]").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.servers[0].name, "s");
        assert_eq!(config.client_info(), ClientInfo::default());

        let missing = ClientConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(missing.to_string().contains("failed to read"));
    }
}
