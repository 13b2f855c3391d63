//! platconf CLI entry point.

use clap::Parser;

use platconf_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    platconf_cli::logging::init(cli.log_format.unwrap_or(config.log_format));
    tracing::debug!(source = %cli.config_source(), "Loaded configuration");

    if let Err(e) = dispatch(cli, config).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
