//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// PoolWatch - pool and delegation balance notifications over Telegram
#[derive(Parser, Debug)]
#[command(
    name = "pw",
    about = "Watch pool and delegation balances and report changes to Telegram",
    version,
    after_help = "Logs are written to: ~/.local/share/poolwatch/logs/poolwatch.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the bot until interrupted
    Run,

    /// Print persisted notification targets and exit
    Targets,
}
