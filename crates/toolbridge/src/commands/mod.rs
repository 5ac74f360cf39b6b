//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use toolbridge_mcp::{CallToolResult, ClientConfig, ToolDescriptor};

pub mod call;
pub mod probe;
pub mod tools;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, if given.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the server config from `--config` or the default location.
    pub fn load_config(&self) -> Result<ClientConfig> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => ClientConfig::default_path()
                .context("could not determine the config directory; pass --config")?,
        };
        if !path.exists() {
            anyhow::bail!(
                "config file not found: {} (pass --config or set TOOLBRIDGE_CONFIG)",
                path.display()
            );
        }
        Ok(ClientConfig::load(&path)?)
    }
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_env_var(var: &str) -> Result<(String, String)> {
    match var.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => anyhow::bail!("Invalid environment variable format: '{var}'. Use KEY=VALUE."),
    }
}

/// Print tools as an indented list.
pub fn print_tool_list(tools: &[ToolDescriptor], show_schema: bool) -> Result<()> {
    if tools.is_empty() {
        println!("  Tools: (none)");
        return Ok(());
    }
    println!("  Tools ({}):", tools.len());
    for tool in tools {
        if tool.description.is_empty() {
            println!("    - {}", tool.name);
        } else {
            println!("    - {}: {}", tool.name, truncate(&tool.description, 60));
        }
        if show_schema {
            println!("      {}", serde_json::to_string(&tool.input_schema)?);
        }
    }
    Ok(())
}

/// Print a tool result: text content for humans, full JSON for scripts.
pub fn print_call_result(result: &CallToolResult, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        let text = result.text();
        if text.is_empty() {
            println!("{}", serde_json::to_string_pretty(&result.content)?);
        } else {
            println!("{text}");
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
