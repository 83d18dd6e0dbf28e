//! velotune - Main Entry Point

use clap::Parser;
use velotune::cli::Cli;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velotune=info".into()),
        )
        .init();

    Cli::parse().command.run()
}
