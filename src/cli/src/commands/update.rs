//! `platconf update` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use platconf_core::config::UpdateConfig;
use platconf_core::status::LogStatusSink;
use platconf_runtime::Updater;

#[derive(Args)]
pub struct UpdateArgs {
    /// Release channel to update from (default: the channel file, then "soul3")
    #[arg(short, long)]
    pub channel: Option<String>,

    /// Maximum number of concurrent image pulls
    #[arg(short, long)]
    pub pullers: Option<usize>,

    /// Root of the filesystem to update
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Do not reboot after a successful update
    #[arg(long)]
    pub no_reboot: bool,
}

impl UpdateArgs {
    /// Overlay the command line onto the loaded configuration.
    fn apply(self, mut config: UpdateConfig) -> UpdateConfig {
        if let Some(channel) = self.channel {
            config.channel = Some(channel);
        }
        if let Some(pullers) = self.pullers {
            config.pullers = pullers;
        }
        if let Some(root) = self.root {
            config.root_dir = root;
        }
        if self.no_reboot {
            config.reboot = false;
        }
        config
    }
}

pub async fn execute(args: UpdateArgs, config: UpdateConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.apply(config);
    config.validate()?;
    tracing::debug!(
        root = %config.root_dir.display(),
        pullers = config.pullers,
        reboot = config.reboot,
        "Effective update settings"
    );

    let report = Updater::from_config(config)
        .with_status_sink(Arc::new(LogStatusSink))
        .run()
        .await?;

    println!(
        "Updated to build {} ({}) from channel '{}'",
        report.build, report.codename, report.channel.channel
    );
    if !report.rebooted {
        println!("Reboot skipped");
    }
    Ok(())
}
