//! CLI command definitions and dispatch.

mod update;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use platconf_core::config::{LogFormat, UpdateConfig};

/// platconf - appliance OS update orchestrator.
#[derive(Parser)]
#[command(name = "platconf", version, about)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (text, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Load the configuration file, or the defaults when none was given.
    pub fn load_config(&self) -> platconf_core::Result<UpdateConfig> {
        match &self.config {
            Some(path) => UpdateConfig::from_file(path),
            None => Ok(UpdateConfig::default()),
        }
    }

    /// Where the configuration came from, for logging.
    pub fn config_source(&self) -> String {
        match &self.config {
            Some(path) => path.display().to_string(),
            None => "built-in defaults".to_string(),
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Update the system to the latest release of a channel
    Update(update::UpdateArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI command to its handler.
pub async fn dispatch(cli: Cli, config: UpdateConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Update(args) => update::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}
