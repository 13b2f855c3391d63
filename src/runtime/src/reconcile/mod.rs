//! Filesystem reconciliation.
//!
//! Brings the local scripts, service units and configuration in line with
//! an extracted configure image. Every operation takes absolute paths only
//! and fails with `ReconcileError::RelativePath` before touching anything
//! when given a relative one. None of the operations lock: a single update
//! run is assumed to own these directories.

use std::path::{Path, PathBuf};

pub mod fs;
pub mod prune;
pub mod release;
pub mod scripts;
pub mod templates;
pub mod units;

pub use fs::{copy_file, ensure_dirs, require_absolute};
pub use prune::{
    cleanup_units, is_broken_link, is_managed_unit, prune_broken_links, prune_managed_units,
    MANAGED_MARKER,
};
pub use release::{ensure_default_hostname, write_release_metadata};
pub use scripts::install_scripts;
pub use templates::{render_template, render_templates};
pub use units::{enableable_units, install_udev_rules, install_unit_files, WAIT_ONLINE_UNIT};

/// Layout of an extracted configure image.
#[derive(Debug, Clone)]
pub struct ConfigureTree {
    root: PathBuf,
}

impl ConfigureTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Utility scripts.
    pub fn scripts(&self) -> PathBuf {
        self.root.join("scripts")
    }

    /// Service definition templates.
    pub fn services(&self) -> PathBuf {
        self.root.join("services")
    }

    /// Drop-ins, network files and device rules.
    pub fn config(&self) -> PathBuf {
        self.root.join("config")
    }
}
