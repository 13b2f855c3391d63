//! Removal of stale managed configuration.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use platconf_core::error::ReconcileError;

use super::fs::{require_absolute, sorted_entries};

/// First-line marker of files installed by the update.
pub const MANAGED_MARKER: &str = "# ExperimentalPlatform";

/// Whether `path` is a symlink whose final target does not exist.
///
/// The whole link chain is followed, so a link to a broken link is broken
/// too, and so is a link loop.
pub fn is_broken_link(path: &Path) -> Result<bool, ReconcileError> {
    require_absolute(path)?;

    let metadata = fs::symlink_metadata(path).map_err(|e| ReconcileError::io("stat", path, e))?;
    if !metadata.file_type().is_symlink() {
        return Ok(false);
    }
    Ok(fs::metadata(path).is_err())
}

/// Whether `path` is a regular file whose first line carries [`MANAGED_MARKER`].
pub fn is_managed_unit(path: &Path) -> Result<bool, ReconcileError> {
    require_absolute(path)?;

    let metadata = fs::symlink_metadata(path).map_err(|e| ReconcileError::io("stat", path, e))?;
    if !metadata.is_file() {
        return Ok(false);
    }

    let file = fs::File::open(path).map_err(|e| ReconcileError::io("open", path, e))?;
    let mut first_line = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut first_line)
        .map_err(|e| ReconcileError::io("read", path, e))?;

    // Prefix match tolerates trailing whitespace after the marker.
    Ok(first_line.starts_with(MANAGED_MARKER.as_bytes()))
}

/// Entries of `dir`, or nothing if `dir` does not exist.
fn entries_or_empty(dir: &Path) -> Result<Vec<fs::DirEntry>, ReconcileError> {
    match fs::symlink_metadata(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        _ => sorted_entries(dir),
    }
}

fn remove(path: &Path) -> Result<(), ReconcileError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(ReconcileError::io("remove", path, e)),
        _ => Ok(()),
    }
}

/// Delete every broken symlink directly inside `dir`. Returns how many were removed.
pub fn prune_broken_links(dir: &Path) -> Result<usize, ReconcileError> {
    require_absolute(dir)?;

    let mut removed = 0;
    for entry in entries_or_empty(dir)? {
        let path = entry.path();
        if is_broken_link(&path)? {
            tracing::debug!(path = %path.display(), "Removing broken link");
            remove(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Delete every managed file directly inside `dir`. Returns how many were removed.
pub fn prune_managed_units(dir: &Path) -> Result<usize, ReconcileError> {
    require_absolute(dir)?;

    let mut removed = 0;
    for entry in entries_or_empty(dir)? {
        let path = entry.path();
        if is_managed_unit(&path)? {
            tracing::debug!(path = %path.display(), "Removing managed unit");
            remove(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove stale units from the system and network unit directories.
///
/// Broken links go first, then managed units, then the links those units
/// left dangling.
pub fn cleanup_units(system_dir: &Path, network_dir: &Path) -> Result<(), ReconcileError> {
    require_absolute(system_dir)?;
    require_absolute(network_dir)?;

    tracing::info!(dir = %system_dir.display(), "Cleaning up units");
    let links = prune_broken_links(system_dir)?;
    let units = prune_managed_units(system_dir)?;
    let dangling = prune_broken_links(system_dir)?;
    let network = prune_managed_units(network_dir)?;

    tracing::info!(
        broken_links = links + dangling,
        units,
        network_units = network,
        "Cleaned up units"
    );
    Ok(())
}
