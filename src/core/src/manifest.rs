//! Release manifest model.
//!
//! A manifest describes one build of the platform: its build number,
//! codename, release notes, and the container images it consists of.
//! Decoding is forward compatible: unknown fields are ignored and absent
//! fields take their zero value.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// A versioned release descriptor for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseManifest {
    /// Build number
    pub build: i32,

    /// Release codename
    pub codename: String,

    /// Link to the release notes
    #[serde(rename = "url")]
    pub release_notes_url: String,

    /// Publication timestamp, kept verbatim
    pub published_at: String,

    /// Images making up the release, in manifest order
    pub images: Vec<ImageRef>,
}

/// One container image referenced by a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRef {
    /// Full image name including the registry, without tag
    pub name: String,

    /// Image tag
    pub tag: String,

    /// Whether the image should be fetched ahead of time
    pub pre_download: bool,
}

impl ImageRef {
    /// Create an image reference.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            pre_download: false,
        }
    }

    /// `name:tag` form used by the container runtime.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

impl ReleaseManifest {
    /// Decode a manifest from its JSON wire form.
    pub fn from_json(data: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Look up an image by its full name.
    pub fn image(&self, name: &str) -> Option<&ImageRef> {
        self.images.iter().find(|img| img.name == name)
    }

    /// Check the manifest invariants: at least one image, unique names.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.images.is_empty() {
            return Err(ManifestError::Invalid(
                "manifest lists no images".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for img in &self.images {
            if !seen.insert(img.name.as_str()) {
                return Err(ManifestError::Invalid(format!(
                    "image '{}' is listed more than once",
                    img.name
                )));
            }
        }

        Ok(())
    }
}
