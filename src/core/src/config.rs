use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};

/// Default number of concurrent image pulls.
pub const DEFAULT_PULLERS: usize = 4;

/// Channel used when neither the command line nor the channel file names one.
pub const DEFAULT_CHANNEL: &str = "soul3";

/// Image whose filesystem carries the scripts, units and config to install.
pub const CONFIGURE_IMAGE: &str = "quay.io/experimentalplatform/configure";

/// Where channel manifests are published.
pub const MANIFEST_BASE_URL: &str =
    "https://raw.githubusercontent.com/protonet/builds/master/manifest-v2";

/// Update configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Root of the filesystem being updated
    pub root_dir: PathBuf,

    /// Channel requested explicitly, overriding the channel file
    pub channel: Option<String>,

    /// Channel used when nothing else selects one
    pub default_channel: String,

    /// Maximum number of images pulled at once
    pub pullers: usize,

    /// Base URL of the manifest store; `<base>/<channel>.json` is fetched
    pub manifest_base_url: String,

    /// Container runtime API socket
    pub docker_socket: PathBuf,

    /// Container runtime API version
    pub docker_api_version: String,

    /// Name of the configure image in the manifest
    pub configure_image: String,

    /// Entries of the binary directory that are never removed
    pub protected_binaries: Vec<String>,

    /// Reboot once the update completed
    pub reboot: bool,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            channel: None,
            default_channel: DEFAULT_CHANNEL.to_string(),
            pullers: DEFAULT_PULLERS,
            manifest_base_url: MANIFEST_BASE_URL.to_string(),
            docker_socket: PathBuf::from("/var/run/docker.sock"),
            docker_api_version: "1.22".to_string(),
            configure_image: CONFIGURE_IMAGE.to_string(),
            protected_binaries: vec!["protonet_zpool.sh".to_string(), "platconf".to_string()],
            reboot: true,
            log_format: LogFormat::Text,
        }
    }
}

impl UpdateConfig {
    /// Load configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            UpdateError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    /// Reject settings the update cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pullers < 1 {
            return Err(UpdateError::Config(
                "The maximum number of pullers must be > 0".to_string(),
            ));
        }
        if !self.root_dir.is_absolute() {
            return Err(UpdateError::Config(format!(
                "root directory must be absolute: {}",
                self.root_dir.display()
            )));
        }
        if self.configure_image.is_empty() {
            return Err(UpdateError::Config(
                "configure image name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn rooted(&self, relative: &str) -> PathBuf {
        self.root_dir.join(relative)
    }

    /// File holding the persisted channel selection.
    pub fn channel_file(&self) -> PathBuf {
        self.rooted("etc/protonet/system/channel")
    }

    /// Directory receiving release metadata files.
    pub fn release_dir(&self) -> PathBuf {
        self.rooted("etc/protonet/system")
    }

    /// Default hostname file.
    pub fn hostname_file(&self) -> PathBuf {
        self.rooted("etc/protonet/hostname")
    }

    /// Directory with the utility script symlinks.
    pub fn bin_dir(&self) -> PathBuf {
        self.rooted("opt/bin")
    }

    /// Directory with the installed utility scripts.
    pub fn scripts_dir(&self) -> PathBuf {
        self.rooted("etc/systemd/system/scripts")
    }

    /// systemd system unit directory.
    pub fn system_unit_dir(&self) -> PathBuf {
        self.rooted("etc/systemd/system")
    }

    /// systemd-networkd configuration directory.
    pub fn network_unit_dir(&self) -> PathBuf {
        self.rooted("etc/systemd/network")
    }

    /// Drop-in directory for the container runtime service.
    pub fn docker_dropin_dir(&self) -> PathBuf {
        self.rooted("etc/systemd/system/docker.service.d")
    }

    /// journald drop-in directory.
    pub fn journald_dropin_dir(&self) -> PathBuf {
        self.rooted("etc/systemd/journald.conf.d")
    }

    /// udev rules directory.
    pub fn udev_rules_dir(&self) -> PathBuf {
        self.rooted("etc/udev/rules.d")
    }

    /// sysctl drop-in directory.
    pub fn sysctl_dir(&self) -> PathBuf {
        self.rooted("etc/sysctl.d")
    }

    /// Every directory the update writes into.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.rooted("etc/protonet"),
            self.release_dir(),
            self.journald_dropin_dir(),
            self.system_unit_dir(),
            self.docker_dropin_dir(),
            self.scripts_dir(),
            self.network_unit_dir(),
            self.udev_rules_dir(),
            self.sysctl_dir(),
            self.bin_dir(),
        ]
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Human-readable lines (default).
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: '{}' (supported: text, json)", s)),
        }
    }
}
