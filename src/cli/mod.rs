//! CLI Module
//!
//! Command-line interface for slimclaw using Clap v4 (`Parser`/`Subcommand`
//! shape, global `--config`).

use crate::config::Config;
use crate::metrics::TotalsSnapshot;
use crate::sidecar::Sidecar;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// slimclaw — LLM inference-optimization proxy
#[derive(Parser, Debug)]
#[command(name = "slimclaw")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to `~/.slimclaw/config.toml`)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the streaming sidecar server (the crate's primary mode)
    Serve {
        /// Bind port; 0 means OS-assigned
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the aggregated `/slimclaw` status block
    Status,

    /// Print the effective configuration
    Config {
        /// Include provider API keys (redacted by default)
        #[arg(short, long)]
        show_secrets: bool,
    },

    /// Write a fresh default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

fn load_config(config_path: &Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path).with_context(|| format!("loading config from {}", path.display())),
        None => {
            let default_path = Config::default_path();
            if default_path.exists() {
                Config::load(&default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Dispatches the parsed CLI to its handler. Returns an error for the host
/// process to report; exit codes are the binary's concern.
pub async fn run(cli: Cli) -> Result<()> {
    let Cli { config: config_path, command } = cli;
    match command.unwrap_or(Commands::Serve { port: None, bind: None }) {
        Commands::Serve { port, bind } => cmd_serve(&config_path, port, bind).await,
        Commands::Status => cmd_status(&config_path).await,
        Commands::Config { show_secrets } => cmd_config(&config_path, show_secrets).await,
        Commands::Init { force } => cmd_init(force),
    }
}

async fn cmd_serve(config_path: &Option<PathBuf>, port: Option<u16>, bind: Option<String>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.sidecar.port = port;
    }
    if let Some(bind) = bind {
        config.sidecar.bind = bind;
    }

    let sidecar = Sidecar::new(config).context("constructing sidecar")?;
    let bound_port = sidecar.start().await.context("starting sidecar")?;
    println!("slimclaw sidecar listening on port {bound_port}");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    println!("shutting down...");
    sidecar.stop().await.context("stopping sidecar")?;
    Ok(())
}

/// Prints the aggregated status block. Metrics persistence is explicitly
/// the host's responsibility, so a freshly invoked CLI process reports a
/// zeroed snapshot alongside the effective config —
/// the live, non-zero totals are only meaningful while a `serve` process
/// is running and queried in-process by the host runtime.
async fn cmd_status(config_path: &Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = TotalsSnapshot {
        requests: 0,
        input_tokens: 0,
        output_tokens: 0,
        cache_reads: 0,
        cache_writes: 0,
        average_savings_percent: 0.0,
    };

    println!("slimclaw v{}", crate::VERSION);
    println!();
    println!("config:");
    println!("  mode:     {:?}", config.mode);
    println!("  windowing: {}", config.windowing.enabled);
    println!("  routing:   {}", config.routing.enabled);
    println!("  caching:   {}", config.caching.enabled);
    println!();
    println!("totals (this process):");
    println!("  requests:          {}", snapshot.requests);
    println!("  input tokens:      {}", snapshot.input_tokens);
    println!("  output tokens:     {}", snapshot.output_tokens);
    println!("  cache reads:       {}", snapshot.cache_reads);
    println!("  cache writes:      {}", snapshot.cache_writes);
    println!("  avg savings:       {:.1}%", snapshot.average_savings_percent);
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>, show_secrets: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config).context("serializing config")?;
    if show_secrets {
        println!("# secrets are redacted regardless of --show-secrets; see config/secrets.rs");
    }
    println!("{toml_str}");
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let path = Config::default_path();
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(&path)?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve_with_port() {
        let cli = Cli::parse_from(["slimclaw", "serve", "--port", "9090"]);
        match cli.command {
            Some(Commands::Serve { port, .. }) => assert_eq!(port, Some(9090)),
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn cli_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["slimclaw"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_status() {
        let cli = Cli::parse_from(["slimclaw", "status"]);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }
}
