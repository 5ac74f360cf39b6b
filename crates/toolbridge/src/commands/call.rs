//! `toolbridge call` - invoke one tool on a configured server.

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;
use toolbridge_mcp::McpClient;

use super::{Context, print_call_result};

/// Arguments for `toolbridge call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Name of the configured MCP server
    pub server: String,

    /// Tool to call
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, short = 'a', default_value = "{}")]
    pub args: String,
}

/// Run `toolbridge call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let arguments: Value = serde_json::from_str(&args.args)
        .with_context(|| format!("invalid --args JSON: {}", args.args))?;
    if !arguments.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }

    let config = ctx.load_config()?;
    let server = config
        .server(&args.server)
        .with_context(|| format!("MCP server '{}' is not configured", args.server))?
        .clone();

    let client = McpClient::with_client_info(server, config.client_info());
    client
        .try_connect()
        .await
        .with_context(|| format!("failed to connect to '{}'", args.server))?;

    if !client.has_tool(&args.tool) {
        tracing::warn!(server = %args.server, tool = %args.tool, "tool not advertised by server");
    }

    let result = client.call_tool(&args.tool, arguments).await;
    print_call_result(&result, ctx.json_output)?;
    client.disconnect();

    if result.is_error() {
        anyhow::bail!("tool '{}' reported an error", args.tool);
    }
    Ok(())
}
