//! `toolbridge probe` - spawn an unconfigured server and report what it offers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::json;
use toolbridge_mcp::{McpClient, McpServerConfig};

use super::{Context, parse_env_var, print_tool_list};

/// Arguments for `toolbridge probe`.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Server executable or script
    pub path: PathBuf,

    /// Interpreter to run the script with (e.g. node)
    #[arg(long)]
    pub command: Option<String>,

    /// Environment variables in KEY=VALUE format
    #[arg(long = "env", short = 'e')]
    pub env_vars: Vec<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    pub timeout_ms: u64,

    /// Show full input schemas
    #[arg(long)]
    pub schema: bool,

    /// Arguments to pass to the server
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl ProbeArgs {
    fn server_config(&self) -> Result<McpServerConfig> {
        let mut config = McpServerConfig::new("probe", &self.path)
            .with_args(self.args.clone())
            .with_timeout(Duration::from_millis(self.timeout_ms));
        if let Some(command) = &self.command {
            config = config.with_command(command);
        }
        for var in &self.env_vars {
            let (key, value) = parse_env_var(var)?;
            config = config.with_env_var(key, value);
        }
        Ok(config)
    }
}

/// Run `toolbridge probe`.
pub async fn run(args: ProbeArgs, ctx: &Context) -> Result<()> {
    let config = args.server_config()?;
    let client = McpClient::new(config);
    client
        .try_connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.path.display()))?;

    let init = client.initialize_result().unwrap_or_default();
    let tools = client.get_tools();

    if ctx.json_output {
        let output = json!({
            "server": init.server_info,
            "protocolVersion": init.protocol_version,
            "capabilities": init.capabilities,
            "tools": tools,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "{} {} (protocol {})",
            init.server_info.name, init.server_info.version, init.protocol_version
        );
        if ctx.verbose
            && let Some(path) = client.executable()
        {
            println!("  Executable: {}", path.display());
        }
        print_tool_list(&tools, args.schema)?;
    }

    client.disconnect();
    Ok(())
}
