//! Filesystem primitives shared by the reconciler.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use platconf_core::error::ReconcileError;

/// Mode of installed scripts.
pub const SCRIPT_MODE: u32 = 0o755;

/// Mode of installed configuration and unit files.
pub const CONFIG_MODE: u32 = 0o644;

/// Mode of directories created by the update.
pub const DIR_MODE: u32 = 0o755;

/// Fail with [`ReconcileError::RelativePath`] unless `path` is absolute.
pub fn require_absolute(path: &Path) -> Result<(), ReconcileError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ReconcileError::RelativePath(path.to_path_buf()))
    }
}

/// Copy the regular file `src` to `dst`, leaving `dst` with exactly `mode`.
///
/// `dst` is created or truncated and flushed to disk before returning.
pub fn copy_file(dst: &Path, src: &Path, mode: u32) -> Result<(), ReconcileError> {
    require_absolute(dst)?;
    require_absolute(src)?;

    let metadata = fs::metadata(src).map_err(|e| ReconcileError::io("stat", src, e))?;
    if !metadata.is_file() {
        return Err(ReconcileError::NotRegularFile(src.to_path_buf()));
    }

    let mut source = fs::File::open(src).map_err(|e| ReconcileError::io("open", src, e))?;
    let mut target = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(dst)
        .map_err(|e| ReconcileError::io("create", dst, e))?;

    io::copy(&mut source, &mut target).map_err(|e| ReconcileError::io("copy to", dst, e))?;
    // The open mode is filtered by the umask and ignored for existing files.
    target
        .set_permissions(fs::Permissions::from_mode(mode))
        .map_err(|e| ReconcileError::io("chmod", dst, e))?;
    target
        .sync_all()
        .map_err(|e| ReconcileError::io("sync", dst, e))?;

    Ok(())
}

/// Write `contents` to `path` with exactly `mode`.
pub fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), ReconcileError> {
    require_absolute(path)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| ReconcileError::io("create", path, e))?;
    file.write_all(contents)
        .map_err(|e| ReconcileError::io("write", path, e))?;
    file.set_permissions(fs::Permissions::from_mode(mode))
        .map_err(|e| ReconcileError::io("chmod", path, e))?;
    file.sync_all()
        .map_err(|e| ReconcileError::io("sync", path, e))?;

    Ok(())
}

/// Create every directory in `dirs` (and missing parents) with [`DIR_MODE`].
pub fn ensure_dirs(dirs: &[PathBuf]) -> Result<(), ReconcileError> {
    for dir in dirs {
        require_absolute(dir)?;
    }
    for dir in dirs {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(dir).map_err(|e| ReconcileError::io("create directory", dir, e))?;
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_MODE))
            .map_err(|e| ReconcileError::io("chmod", dir, e))?;
        tracing::debug!(path = %dir.display(), "Created directory");
    }
    Ok(())
}

/// Entries of `dir` sorted by file name.
pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>, ReconcileError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| ReconcileError::io("read directory", dir, e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| ReconcileError::io("read directory", dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}
