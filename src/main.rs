// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Assemble {
            source,
            build,
            output,
        } => commands::cmd_assemble(&source, &build, output.as_deref()),
        Commands::Check { source, build } => commands::cmd_check(&source, &build),
        Commands::Capabilities {
            source,
            format,
            declarative,
        } => commands::cmd_capabilities(&source, &format, declarative),
    }
}
