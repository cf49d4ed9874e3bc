//! Thin binary entry point. Parses the CLI and dispatches to its handlers;
//! all real logic lives in the library crate.

use clap::Parser;
use slimclaw::cli::Cli;
use slimclaw::logging::{self, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(LogFormat::Pretty, None);

    if let Err(err) = slimclaw::cli::run(cli).await {
        tracing::error!(error = %err, "command failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}
