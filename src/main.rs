// ABOUTME: Entry point for the sshrun CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use sshrun::config::{self, Config};
use sshrun::error::Result;
use sshrun::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { force } => {
            let path = config::init_config(&cwd, force)?;
            output.success(&format!("Created {}", path.display()));
            Ok(())
        }
        Commands::Exec(args) => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::exec_command(config, args, output).await
        }
        Commands::Hosts => {
            let config = match cli.config.as_deref() {
                Some(path) => Config::load(path)?,
                None => Config::discover(&cwd)?,
            };
            commands::list_hosts(&config, &output)
        }
    }
}

/// An explicit config path must exist; a discovered one is optional.
fn load_config(path: Option<&std::path::Path>, cwd: &std::path::Path) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover_or_default(cwd),
    }
}
