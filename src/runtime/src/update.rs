//! End-to-end update run.
//!
//! The stages run strictly in sequence and the first failure ends the run.
//! There is no rollback: a failed run leaves the device partially updated
//! and running the update again is the recovery path.

use std::path::PathBuf;
use std::sync::Arc;

use platconf_core::config::UpdateConfig;
use platconf_core::error::{Result, UpdateError};
use platconf_core::status::{NoopStatusSink, Phase, Status, StatusSink};

use crate::channel::{persist_channel, resolve_channel, ChannelSelection};
use crate::container::{ContainerRuntime, DockerEngine};
use crate::export::Exporter;
use crate::host_check::require_elevated;
use crate::manifest::ManifestResolver;
use crate::pull::ImagePuller;
use crate::reconcile::{self, ConfigureTree};
use crate::services::{ServiceManager, Systemctl};

/// Prefix of the per-run staging directory.
pub const STAGING_PREFIX: &str = "platconf_";

/// Summary of a completed update.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    /// Channel the release came from
    pub channel: ChannelSelection,
    /// Installed build number
    pub build: i32,
    /// Installed release codename
    pub codename: String,
    /// Number of images pulled
    pub images: usize,
    /// Whether a reboot was scheduled
    pub rebooted: bool,
}

/// Runs an update against the configured root filesystem.
pub struct Updater {
    config: UpdateConfig,
    resolver: ManifestResolver,
    runtime: Arc<dyn ContainerRuntime>,
    services: Arc<dyn ServiceManager>,
    status: Arc<dyn StatusSink>,
    privilege_check: fn() -> Result<()>,
    staging_parent: Option<PathBuf>,
}

impl Updater {
    /// Create an updater with explicit collaborators.
    pub fn new(
        config: UpdateConfig,
        runtime: Arc<dyn ContainerRuntime>,
        services: Arc<dyn ServiceManager>,
    ) -> Self {
        Self {
            resolver: ManifestResolver::from_config(&config),
            config,
            runtime,
            services,
            status: Arc::new(NoopStatusSink),
            privilege_check: require_elevated,
            staging_parent: None,
        }
    }

    /// Create an updater talking to the local container engine and init system.
    pub fn from_config(config: UpdateConfig) -> Self {
        let runtime = Arc::new(DockerEngine::from_config(&config));
        Self::new(config, runtime, Arc::new(Systemctl::new()))
    }

    /// Report progress to `sink`.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    /// Replace the root privilege check.
    pub fn with_privilege_check(mut self, check: fn() -> Result<()>) -> Self {
        self.privilege_check = check;
        self
    }

    /// Create staging directories below `parent` instead of the system temp dir.
    pub fn with_staging_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.staging_parent = Some(parent.into());
        self
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Run the update. Failures are reported to the status sink before returning.
    pub async fn run(&self) -> Result<UpdateReport> {
        match self.execute().await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!(error = %e, "Update failed");
                self.status
                    .notify(&Status::new(Phase::Error).with_what(e.to_string()));
                Err(e)
            }
        }
    }

    fn staging_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match &self.staging_parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn execute(&self) -> Result<UpdateReport> {
        let config = &self.config;
        tracing::info!("Checking privileges");
        (self.privilege_check)()?;

        self.status.notify(&Status::new(Phase::Preparing));
        config.validate()?;

        self.status.notify(&Status::new(Phase::Resolving));
        let selection = resolve_channel(
            config.channel.as_deref(),
            &config.channel_file(),
            &config.default_channel,
        );

        tracing::info!(channel = %selection.channel, "Fetching release manifest");
        let manifest = self.resolver.resolve(&selection.channel).await?;
        manifest.validate()?;

        let configure = manifest
            .image(&config.configure_image)
            .cloned()
            .ok_or_else(|| UpdateError::ConfigureImageMissing(config.configure_image.clone()))?;

        let staging = self.staging_dir()?;
        let tree = ConfigureTree::new(staging.path());
        let puller =
            ImagePuller::new(Arc::clone(&self.runtime)).with_status_sink(Arc::clone(&self.status));

        tracing::info!(image = %configure, "Pulling configure image");
        puller.pull(&configure).await?;
        tracing::info!(image = %configure, target = %tree.root().display(), "Extracting configure image");
        Exporter::new(Arc::clone(&self.runtime))
            .materialize(&configure.name, &configure.tag, tree.root())
            .await?;

        tracing::info!(root = %config.root_dir.display(), "Creating required directories");
        reconcile::ensure_dirs(&config.required_dirs())?;
        reconcile::ensure_default_hostname(&config.hostname_file())?;

        puller.pull_all(&manifest.images, config.pullers).await?;

        tracing::info!("Installing utility scripts");
        reconcile::install_scripts(
            &tree.scripts(),
            &config.scripts_dir(),
            &config.bin_dir(),
            &config.protected_binaries,
        )?;

        tracing::info!("Rendering service templates");
        reconcile::render_templates(&tree.services(), &manifest)?;

        reconcile::cleanup_units(&config.system_unit_dir(), &config.network_unit_dir())?;

        tracing::info!("Setting up udev rules");
        reconcile::install_udev_rules(&tree.config(), &config.udev_rules_dir())?;
        self.services.reload_udev_rules().await?;

        tracing::info!("Setting up systemd units");
        reconcile::install_unit_files(&tree.services(), &tree.config(), config)?;
        self.services.reload_daemon().await?;
        self.services
            .enable_units(&[reconcile::WAIT_ONLINE_UNIT.to_string()])
            .await?;
        let units = reconcile::enableable_units(&config.system_unit_dir())?;
        self.services.enable_units(&units).await?;

        persist_channel(&config.channel_file(), &selection.channel, self.services.as_ref()).await?;

        self.status.notify(&Status::new(Phase::Finalizing));
        reconcile::write_release_metadata(&config.release_dir(), &manifest)?;

        drop(staging);
        self.status.notify(&Status::new(Phase::Done));
        tracing::info!(
            build = manifest.build,
            codename = %manifest.codename,
            "Update complete"
        );

        if config.reboot {
            tracing::info!("Rebooting");
            self.services.reboot().await?;
        } else {
            tracing::info!("Reboot disabled, not rebooting");
        }

        Ok(UpdateReport {
            channel: selection,
            build: manifest.build,
            codename: manifest.codename,
            images: manifest.images.len(),
            rebooted: config.reboot,
        })
    }
}
