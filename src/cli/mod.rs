//! CLI interface for riskpilot
//!
//! Provides subcommands for:
//! - `run`: Start the paper engine
//! - `status`: Show current state
//! - `config`: Show effective configuration

mod run;

pub use run::{Engine, RunArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "riskpilot")]
#[command(about = "Risk and execution engine for leveraged crypto strategies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the paper engine
    Run(RunArgs),
    /// Show current state
    Status,
    /// Show effective configuration
    Config,
}
