// Multi-Reasoner Bridge - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// CLI and MCP stdio server. All tool calls route through the Dispatcher.
// Usage:
//   multi-reasoner [serve]                                     # Run MCP server (stdio)
//   multi-reasoner tools                                       # Print the tool catalog
//   multi-reasoner status                                      # Per-backend readiness
//   multi-reasoner ask <tool> <input> [--depth] [--mode] [--file]  # One-shot tool call
//   multi-reasoner check-files <path>...                       # Run only the path gate

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use multi_reasoner::{
    config::BridgeConfig,
    dispatch::{Dispatcher, Tool},
    gate::PathGate,
    mcp,
    request::{Depth, Mode, ReasoningRequest},
};

#[derive(Parser)]
#[command(name = "multi-reasoner")]
#[command(author = "Joseph Stone")]
#[command(version)]
#[command(about = "Multi-Reasoner Bridge - second-opinion reasoning tools over MCP")]
struct Cli {
    /// High-depth timeout in seconds (overrides REASONER_TIMEOUT_SECS)
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run MCP server (stdio JSON-RPC). Default when no command is given.
    Serve,

    /// Print the MCP tool catalog as JSON
    Tools,

    /// Show configuration and per-backend readiness (binary on PATH, key set)
    Status,

    /// Run one reasoning tool once and print its answer
    Ask {
        /// Tool name (chatgpt, gemini, grok, mistral, consensus)
        tool: String,

        /// The question or text to reason about
        input: String,

        #[arg(short, long, default_value = "high")]
        depth: Depth,

        #[arg(short, long, default_value = "memo")]
        mode: Mode,

        /// File to attach (repeatable)
        #[arg(short, long = "file")]
        files: Vec<String>,
    },

    /// Run the path gate over the given paths and print what would be attached
    CheckFiles {
        paths: Vec<String>,
    },
}

fn main() -> Result<()> {
    // Initialize logging (safe if already init). stderr only: stdout is JSON-RPC.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    let cli = Cli::parse();

    let mut config = BridgeConfig::from_env();
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(secs);
    }
    let gate = PathGate::for_process();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let dispatcher = Dispatcher::new(config, gate);
            mcp::run(&dispatcher).context("MCP server I/O failed")?;
        }

        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&mcp::tool_definitions())?);
        }

        Commands::Status => {
            println!("Multi-Reasoner Bridge v{}", mcp::SERVER_VERSION);
            println!(
                "Timeouts: low {}s | medium {}s | high {}s",
                config.timeout_for(Depth::Low).as_secs(),
                config.timeout_for(Depth::Medium).as_secs(),
                config.timeout_for(Depth::High).as_secs()
            );
            println!();
            let dispatcher = Dispatcher::new(config, gate);
            for backend in dispatcher.backends() {
                match backend.preflight() {
                    Ok(()) => println!("  {:<8} ready", backend.id()),
                    Err(failure) => {
                        println!("  {:<8} {} ({})", backend.id(), failure.status().as_str(), failure);
                        if let Some(fix) = failure.remediation() {
                            println!("           Fix: {}", fix);
                        }
                    }
                }
            }
        }

        Commands::Ask { tool, input, depth, mode, files } => {
            let tool: Tool = tool.parse()?;
            if tool == Tool::CodexReview {
                bail!("codex_review takes no reasoning input; use the /codex skill");
            }
            let dispatcher = Dispatcher::new(config, gate);
            let request = ReasoningRequest::new(input, depth, mode, files);
            let reply = dispatcher.dispatch(tool, &request);
            println!("{}", reply.render());
            if reply.is_error() {
                std::process::exit(1);
            }
        }

        Commands::CheckFiles { paths } => {
            let outcome = gate.check(&paths);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.rejections.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
