//! Release channel selection and persistence.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use platconf_core::error::{ReconcileError, Result};

use crate::reconcile::fs::{require_absolute, write_file, CONFIG_MODE};
use crate::services::ServiceManager;

/// Unit watching the channel file for changes.
pub const CHANNEL_TRIGGER_UNIT: &str = "trigger-update-protonet.path";

/// Where the chosen channel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSource {
    CommandLine,
    ChannelFile,
    Default,
}

impl fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSource::CommandLine => write!(f, "command line"),
            ChannelSource::ChannelFile => write!(f, "channel file"),
            ChannelSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved channel and its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelection {
    pub channel: String,
    pub source: ChannelSource,
}

/// Pick the channel to update from.
///
/// An explicit request wins, then the trimmed contents of `channel_file`,
/// then `default`. An unreadable or blank channel file falls through.
pub fn resolve_channel(
    requested: Option<&str>,
    channel_file: &Path,
    default: &str,
) -> ChannelSelection {
    let selection = match requested.map(str::trim).filter(|c| !c.is_empty()) {
        Some(channel) => ChannelSelection {
            channel: channel.to_string(),
            source: ChannelSource::CommandLine,
        },
        None => match read_channel(channel_file) {
            Some(channel) => ChannelSelection {
                channel,
                source: ChannelSource::ChannelFile,
            },
            None => ChannelSelection {
                channel: default.to_string(),
                source: ChannelSource::Default,
            },
        },
    };

    tracing::info!(
        channel = %selection.channel,
        source = %selection.source,
        "Using channel '{}' from {}",
        selection.channel,
        selection.source
    );
    selection
}

fn read_channel(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let channel = contents.trim();
            (!channel.is_empty()).then(|| channel.to_string())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read channel file");
            None
        }
    }
}

/// Store `channel` in `channel_file`.
///
/// The trigger unit is stopped while the file changes and restarted
/// afterwards, even when the write failed. Returns whether the file changed.
pub async fn persist_channel(
    channel_file: &Path,
    channel: &str,
    services: &dyn ServiceManager,
) -> Result<bool> {
    require_absolute(channel_file)?;

    if matches!(fs::read_to_string(channel_file), Ok(current) if current == channel) {
        tracing::debug!(channel = %channel, "Channel file is up to date");
        return Ok(false);
    }

    services.stop_unit(CHANNEL_TRIGGER_UNIT).await?;
    let written: std::result::Result<(), ReconcileError> =
        write_file(channel_file, channel.as_bytes(), CONFIG_MODE);
    let restarted = services.restart_unit(CHANNEL_TRIGGER_UNIT).await;

    written?;
    restarted?;
    tracing::info!(channel = %channel, path = %channel_file.display(), "Persisted channel");
    Ok(true)
}
