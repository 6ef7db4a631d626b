//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod health;
mod job;
mod shrinkwrap;

pub use job::JobCommands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Fit a footprint rectangle and frontage from picked points
    Shrinkwrap {
        /// JSON file with rectangle_points, front_points and geometry
        request: PathBuf,

        /// Compute locally instead of calling the orchestrator
        #[arg(long)]
        local: bool,

        /// Write the fit to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check orchestrator health
    Health,
}

/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Shrinkwrap {
            request,
            local,
            output,
        } => shrinkwrap::run(config, &request, local, output.as_deref()).await,
        Commands::Health => health::run(config).await,
    }
}
