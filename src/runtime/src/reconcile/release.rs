//! Release metadata and device identity files.

use std::path::Path;

use platconf_core::error::ReconcileError;
use platconf_core::manifest::ReleaseManifest;

use super::fs::{require_absolute, write_file, CONFIG_MODE};

/// Hostname written when the device has none yet.
pub const DEFAULT_HOSTNAME: &str = "protonet";

/// Record the installed release in `release_dir`.
pub fn write_release_metadata(
    release_dir: &Path,
    manifest: &ReleaseManifest,
) -> Result<(), ReconcileError> {
    require_absolute(release_dir)?;

    let build = manifest.build.to_string();
    let files = [
        ("release_number", build.as_str()),
        ("codename", manifest.codename.as_str()),
        ("release_notes_url", manifest.release_notes_url.as_str()),
    ];
    for (name, contents) in files {
        write_file(&release_dir.join(name), contents.as_bytes(), CONFIG_MODE)?;
    }

    tracing::info!(
        build = manifest.build,
        codename = %manifest.codename,
        "Recorded release metadata"
    );
    Ok(())
}

/// Write [`DEFAULT_HOSTNAME`] to `path` unless it already exists.
///
/// Returns whether the file was written.
pub fn ensure_default_hostname(path: &Path) -> Result<bool, ReconcileError> {
    require_absolute(path)?;

    if path.exists() {
        return Ok(false);
    }
    write_file(path, DEFAULT_HOSTNAME.as_bytes(), CONFIG_MODE)?;
    tracing::info!(path = %path.display(), hostname = DEFAULT_HOSTNAME, "Wrote default hostname");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_write_release_metadata() {
        let tmp = TempDir::new().unwrap();
        let manifest = ReleaseManifest::from_json(
            br#"{"build":12345,"codename":"Kaufman","url":"https://www.example.com/","images":[]}"#,
        )
        .unwrap();

        write_release_metadata(tmp.path(), &manifest).unwrap();

        let read = |name: &str| fs::read_to_string(tmp.path().join(name)).unwrap();
        assert_eq!(read("release_number"), "12345");
        assert_eq!(read("codename"), "Kaufman");
        assert_eq!(read("release_notes_url"), "https://www.example.com/");
    }

    #[test]
    fn test_default_hostname_written_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hostname");

        assert!(ensure_default_hostname(&path).unwrap());
        fs::write(&path, "custom").unwrap();
        assert!(!ensure_default_hostname(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "custom");
    }

    #[test]
    fn test_relative_paths_rejected() {
        let manifest = ReleaseManifest::default();
        assert!(matches!(
            write_release_metadata(Path::new("etc/protonet/system"), &manifest),
            Err(ReconcileError::RelativePath(_))
        ));
        assert!(matches!(
            ensure_default_hostname(Path::new("hostname")),
            Err(ReconcileError::RelativePath(_))
        ));
    }
}
