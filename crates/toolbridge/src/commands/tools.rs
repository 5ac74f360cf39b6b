//! `toolbridge tools` - connect configured servers and list their tools.

use anyhow::Result;
use clap::Args;
use serde_json::json;
use toolbridge_mcp::McpManager;

use super::{Context, print_tool_list};

/// Arguments for `toolbridge tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Only this server
    #[arg(long, short = 's')]
    pub server: Option<String>,

    /// Show full input schemas
    #[arg(long)]
    pub schema: bool,
}

/// Run `toolbridge tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;
    if let Some(only) = &args.server {
        config.servers.retain(|s| &s.name == only);
        if config.servers.is_empty() {
            anyhow::bail!("MCP server '{only}' is not configured");
        }
    }

    if config.servers.is_empty() {
        if ctx.json_output {
            println!("[]");
        } else {
            println!("No MCP servers configured.");
        }
        return Ok(());
    }

    let manager = McpManager::from_config(&config);
    let connected = manager.connect_all().await;
    tracing::debug!(connected, total = manager.config_count(), "connected servers");

    if ctx.json_output {
        let mut output = Vec::new();
        for name in manager.server_names() {
            let Some(client) = manager.get_client(name) else {
                continue;
            };
            let mut entry = json!({ "name": name });
            if client.is_connected() {
                entry["status"] = json!("connected");
                entry["server"] = json!(client.server_info());
                entry["tools"] = json!(client.get_tools());
            } else {
                entry["status"] = json!("error");
            }
            output.push(entry);
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{:<20} {:<12} {:<40}", "NAME", "STATUS", "SERVER");
        println!("{}", "-".repeat(72));
        for name in manager.server_names() {
            let Some(client) = manager.get_client(name) else {
                continue;
            };
            let (status, remote) = match client.server_info() {
                Some(info) if client.is_connected() => {
                    ("connected", format!("{} {}", info.name, info.version))
                }
                _ => ("error", String::new()),
            };
            println!("{:<20} {:<12} {:<40}", name, status, remote);
            if client.is_connected() {
                print_tool_list(&client.get_tools(), args.schema)?;
            } else if ctx.verbose
                && let Some(path) = client.executable()
            {
                println!("  Executable: {}", path.display());
            }
        }
    }

    manager.disconnect_all();
    Ok(())
}
