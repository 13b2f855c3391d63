//! Utility script installation.
//!
//! Scripts live in the scripts directory and are exposed through symlinks
//! in the binary directory named after the script minus its `.sh` suffix.
//! The old set is removed before the new one is installed, so an
//! interrupted run leaves the set incomplete until the next update.

use std::fs;
use std::path::Path;

use platconf_core::error::ReconcileError;

use super::fs::{copy_file, require_absolute, sorted_entries, SCRIPT_MODE};

/// Replace the installed utility scripts with those in `extracted_dir`.
///
/// Every non-directory entry of `bin_dir` is removed except `protected`
/// names, and every regular file of `scripts_dir` is removed. Returns the
/// number of scripts installed.
pub fn install_scripts(
    extracted_dir: &Path,
    scripts_dir: &Path,
    bin_dir: &Path,
    protected: &[String],
) -> Result<usize, ReconcileError> {
    require_absolute(extracted_dir)?;
    require_absolute(scripts_dir)?;
    require_absolute(bin_dir)?;

    for entry in sorted_entries(bin_dir)? {
        let name = entry.file_name();
        let path = entry.path();
        if protected.iter().any(|p| name.to_str() == Some(p.as_str())) {
            tracing::debug!(name = %name.to_string_lossy(), "Keeping protected binary");
            continue;
        }
        let file_type = entry
            .file_type()
            .map_err(|e| ReconcileError::io("stat", &path, e))?;
        if file_type.is_dir() {
            continue;
        }
        tracing::info!(name = %name.to_string_lossy(), "Removing old binary");
        fs::remove_file(&path).map_err(|e| ReconcileError::io("remove", &path, e))?;
    }

    for entry in sorted_entries(scripts_dir)? {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| ReconcileError::io("stat", &path, e))?;
        if file_type.is_file() {
            tracing::info!(name = %entry.file_name().to_string_lossy(), "Removing old script");
            fs::remove_file(&path).map_err(|e| ReconcileError::io("remove", &path, e))?;
        }
    }

    let mut installed = 0;
    for entry in sorted_entries(extracted_dir)? {
        let source = entry.path();
        if source.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        let target = scripts_dir.join(&file_name);
        let link = bin_dir.join(name.strip_suffix(".sh").unwrap_or(&*name));

        copy_file(&target, &source, SCRIPT_MODE)?;
        if fs::symlink_metadata(&link).is_ok() {
            fs::remove_file(&link).map_err(|e| ReconcileError::io("remove", &link, e))?;
        }
        std::os::unix::fs::symlink(&target, &link)
            .map_err(|e| ReconcileError::io("symlink", &link, e))?;

        tracing::info!(script = %name, link = %link.display(), "Installed script");
        installed += 1;
    }

    Ok(installed)
}
