//! Container filesystem export and extraction.
//!
//! Materializes an image's filesystem on disk without buffering it:
//!
//! ```text
//! ┌──────────────┐  export stream  ┌──────────┐  tar entries  ┌──────────────┐
//! │   producer   │ ──────────────▶ │  duplex  │ ────────────▶ │   consumer   │
//! │ (async task) │                 │   pipe   │               │ (blocking)   │
//! └──────────────┘                 └──────────┘               └──────────────┘
//! ```
//!
//! The producer's result is authoritative. When the producer fails the
//! consumer may well see a clean end of archive, so a consumer success
//! alone does not mean the tree is complete.

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::SyncIoBridge;

use platconf_core::error::{ExportError, RuntimeError};
use platconf_core::manifest::ImageRef;

use crate::container::ContainerRuntime;

/// In-memory pipe capacity between producer and consumer.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Mode of directories created during extraction.
const DIR_MODE: u32 = 0o755;

/// Mode of regular files created during extraction.
const FILE_MODE: u32 = 0o644;

/// Exports container filesystems through a container runtime.
pub struct Exporter {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Exporter {
    /// Create an exporter.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Write the filesystem of `image:tag` into `destination`.
    ///
    /// Directories, regular files and symlinks are materialized; every other
    /// entry type is skipped. The ephemeral container is removed whether the
    /// export succeeded or not.
    pub async fn materialize(
        &self,
        image: &str,
        tag: &str,
        destination: &Path,
    ) -> Result<(), ExportError> {
        let reference = ImageRef::new(image, tag).reference();
        let container = self
            .runtime
            .create_container(&reference)
            .await
            .map_err(|source| ExportError::Create {
                reference: reference.clone(),
                source,
            })?;

        tracing::info!(
            reference = %reference,
            container = %container,
            target = %destination.display(),
            "Exporting container filesystem"
        );

        let exported = self.export_into(&container, destination).await;
        let removed = self.runtime.remove_container(&container, true, true).await;

        match (exported, removed) {
            (Ok(()), Ok(())) => {
                tracing::debug!(container = %container, "Removed ephemeral container");
                Ok(())
            }
            (Ok(()), Err(source)) => Err(ExportError::Remove { container, source }),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(remove_err)) => {
                tracing::warn!(
                    container = %container,
                    error = %remove_err,
                    "Failed to remove ephemeral container"
                );
                Err(e)
            }
        }
    }

    async fn export_into(&self, container: &str, destination: &Path) -> Result<(), ExportError> {
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

        let runtime = Arc::clone(&self.runtime);
        let id = container.to_string();
        let producer = tokio::spawn(async move { produce(runtime.as_ref(), &id, writer).await });

        let bridge = SyncIoBridge::new(reader);
        let target = destination.to_path_buf();
        let consumer = tokio::task::spawn_blocking(move || extract_archive(bridge, &target));

        let (produced, consumed) = tokio::join!(producer, consumer);

        let produced = produced.map_err(|e| ExportError::Task(e.to_string()))?;
        let consumed = consumed.map_err(|e| ExportError::Task(e.to_string()))?;

        produced.map_err(|source| ExportError::Export {
            container: container.to_string(),
            source,
        })?;
        consumed
    }
}

/// Stream the container export into the pipe, closing it at the end.
async fn produce(
    runtime: &dyn ContainerRuntime,
    container: &str,
    mut pipe: DuplexStream,
) -> Result<(), RuntimeError> {
    let mut stream = runtime.export_container(container).await?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Err(e) = pipe.write_all(&chunk).await {
            if e.kind() == io::ErrorKind::BrokenPipe {
                // The consumer stopped reading; its own result reports why.
                tracing::debug!(container = %container, "Archive consumer closed the pipe");
                return Ok(());
            }
            return Err(RuntimeError::Io(e));
        }
    }

    pipe.shutdown().await?;
    Ok(())
}

fn extract_error(path: &Path, message: impl std::fmt::Display) -> ExportError {
    ExportError::Extract {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Join an archive entry path onto `root`, refusing paths that escape it.
fn safe_join(root: &Path, entry: &Path) -> Option<PathBuf> {
    let mut target = root.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(target)
}

/// Refuse `target` when a directory between `root` and it is a symlink.
///
/// An earlier archive entry may have planted a link to anywhere on the host.
fn reject_linked_parents(root: &Path, target: &Path) -> Result<(), ExportError> {
    let Some(parent) = target.parent().and_then(|p| p.strip_prefix(root).ok()) else {
        return Ok(());
    };
    let mut current = root.to_path_buf();
    for part in parent.components() {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(extract_error(
                    target,
                    format!("entry passes through a symlink: {}", current.display()),
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(extract_error(&current, e)),
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.exists() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Materialize a tar stream below `destination`.
pub fn extract_archive<R: Read>(reader: R, destination: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(destination).map_err(|e| extract_error(destination, e))?;

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| extract_error(destination, e))?;

    let mut materialized = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| extract_error(destination, e))?;
        let relative = entry
            .path()
            .map_err(|e| extract_error(destination, e))?
            .into_owned();
        let target = safe_join(destination, &relative).ok_or_else(|| {
            extract_error(
                destination,
                format!("entry escapes the destination: {}", relative.display()),
            )
        })?;
        reject_linked_parents(destination, &target)?;

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            if is_symlink(&target) {
                return Err(extract_error(&target, "directory entry replaces a symlink"));
            }
            fs::create_dir_all(&target).map_err(|e| extract_error(&target, e))?;
            fs::set_permissions(&target, fs::Permissions::from_mode(DIR_MODE))
                .map_err(|e| extract_error(&target, e))?;
        } else if kind.is_file() {
            ensure_parent(&target).map_err(|e| extract_error(&target, e))?;
            if is_symlink(&target) {
                fs::remove_file(&target).map_err(|e| extract_error(&target, e))?;
            }
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&target)
                .map_err(|e| extract_error(&target, e))?;
            io::copy(&mut entry, &mut file).map_err(|e| extract_error(&target, e))?;
        } else if kind.is_symlink() {
            let link = entry
                .link_name()
                .map_err(|e| extract_error(&target, e))?
                .ok_or_else(|| extract_error(&target, "symlink entry without a target"))?
                .into_owned();
            ensure_parent(&target).map_err(|e| extract_error(&target, e))?;
            std::os::unix::fs::symlink(&link, &target).map_err(|e| extract_error(&target, e))?;
        } else {
            tracing::trace!(entry = %relative.display(), kind = ?kind, "Skipping archive entry");
            io::copy(&mut entry, &mut io::sink()).map_err(|e| extract_error(&target, e))?;
            continue;
        }
        materialized += 1;
    }

    tracing::debug!(
        target = %destination.display(),
        entries = materialized,
        "Extracted archive"
    );
    Ok(())
}
