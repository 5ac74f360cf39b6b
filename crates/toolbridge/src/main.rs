//! Toolbridge - drive stdio MCP servers from the command line.
//!
//! Main entry point for the toolbridge CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

mod commands;

use commands::{call, probe, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Toolbridge - drive stdio MCP servers from the command line
#[derive(Parser)]
#[command(name = "toolbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Server config file (default: <config dir>/toolbridge/servers.toml)
    #[arg(long, global = true, env = "TOOLBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write JSON logs to daily files in this directory
    #[arg(long, global = true, env = "TOOLBRIDGE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect configured servers and list their tools
    Tools(tools::ToolsArgs),

    /// Call a tool on a configured server
    Call(call::CallArgs),

    /// Spawn an ad-hoc server and report what it offers
    Probe(probe::ProbeArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console goes to stderr so stdout stays clean for results.
    let filter = if cli.verbose {
        "toolbridge=debug,toolbridge_mcp=debug,info"
    } else {
        "toolbridge=info,toolbridge_mcp=info,warn"
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let (file_layer, _guard) = match &cli.log_dir {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "toolbridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "toolbridge=trace,toolbridge_mcp=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Probe(args) => probe::run(args, &ctx).await,
    }
}
