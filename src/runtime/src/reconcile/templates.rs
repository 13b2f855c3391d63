//! Service definition templates.
//!
//! A template names its image as `<host>/<org>/<name>` and carries the
//! `{{tag}}` placeholder where the release's tag belongs. The first image
//! reference in a file selects the tag for every placeholder in it.
//! Files are matched as raw bytes, so content need not be UTF-8.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::bytes::{NoExpand, Regex};

use platconf_core::error::ReconcileError;
use platconf_core::manifest::ReleaseManifest;

use super::fs::{require_absolute, sorted_entries, write_file, CONFIG_MODE};

/// Placeholder replaced by the image tag.
pub const TAG_PLACEHOLDER: &str = "{{tag}}";

// Surrounding characters that may not touch a reference keep paths such
// as `/usr/bin/docker` from matching.
const IMAGE_PATTERN: &str = r"(?-u)(?:^|[^A-Za-z0-9._/\-])(?P<image>[a-z0-9](?:[a-z0-9.\-]*[a-z0-9])?(?::[0-9]+)?/[a-z0-9\-]+/[a-z0-9\-]+)(?:$|[^A-Za-z0-9._/\-])";

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(IMAGE_PATTERN).expect("image reference pattern is valid"))
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&regex::escape(TAG_PLACEHOLDER)).expect("tag placeholder pattern is valid")
    })
}

/// First image reference in `text`, if any.
pub fn find_image_reference(text: &[u8]) -> Option<&str> {
    image_pattern()
        .captures(text)
        .and_then(|caps| caps.name("image"))
        // The pattern only matches ASCII.
        .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
}

/// Render one template in place. Returns whether the file referenced an image.
pub fn render_template(path: &Path, manifest: &ReleaseManifest) -> Result<bool, ReconcileError> {
    require_absolute(path)?;

    let data = fs::read(path).map_err(|e| ReconcileError::io("read", path, e))?;
    let Some(name) = find_image_reference(&data) else {
        return Ok(false);
    };

    let image = manifest
        .image(name)
        .ok_or_else(|| ReconcileError::UnresolvedImage {
            image: name.to_string(),
            path: path.to_path_buf(),
        })?;

    let rendered = placeholder_pattern().replace_all(&data, NoExpand(image.tag.as_bytes()));
    write_file(path, &rendered, CONFIG_MODE)?;

    tracing::debug!(path = %path.display(), image = %image, "Rendered template");
    Ok(true)
}

/// Render every template in `dir`, in file name order.
///
/// Every entry must be a regular file. Returns the number of rendered files.
pub fn render_templates(dir: &Path, manifest: &ReleaseManifest) -> Result<usize, ReconcileError> {
    require_absolute(dir)?;

    let mut rendered = 0;
    for entry in sorted_entries(dir)? {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| ReconcileError::io("stat", &path, e))?;
        if !file_type.is_file() {
            return Err(ReconcileError::NotRegularFile(path));
        }
        if render_template(&path, manifest)? {
            rendered += 1;
        }
    }

    tracing::info!(dir = %dir.display(), rendered, "Rendered service templates");
    Ok(rendered)
}
