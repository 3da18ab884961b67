// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sshrun")]
#[command(about = "Run commands on remote hosts over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print remote output and errors
    #[arg(long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: sshrun.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new sshrun.yml configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Run a command on a remote host (its output is printed only if it exits with 0)
    Exec(ExecArgs),

    /// List configured host aliases
    Hosts,
}

#[derive(clap::Args)]
pub struct ExecArgs {
    /// Host alias from the config, or [user@]host[:port]
    pub target: String,

    /// Port to connect to (overrides the target)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Login name (overrides the target)
    #[arg(short = 'l', long)]
    pub user: Option<String>,

    /// Private key file
    #[arg(short, long)]
    pub identity: Option<PathBuf>,

    /// Read the password from this environment variable
    #[arg(long, value_name = "VAR")]
    pub password_env: Option<String>,

    /// known_hosts file (default: ~/.ssh/known_hosts)
    #[arg(long)]
    pub known_hosts: Option<PathBuf>,

    /// Record unknown host keys instead of rejecting them
    #[arg(long, conflicts_with = "accept_any_host_key")]
    pub trust_on_first_use: bool,

    /// Skip host key verification entirely (insecure)
    #[arg(long)]
    pub accept_any_host_key: bool,

    /// Command deadline, e.g. 30s or 5m
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Command to run on the remote host
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}
