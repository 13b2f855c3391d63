//! platconf runtime - the update engine.
//!
//! This crate resolves release manifests, pulls container images, exports
//! the configure image's filesystem and reconciles the local system
//! configuration against it.

#![allow(clippy::result_large_err)]

pub mod channel;
pub mod container;
pub mod export;
pub mod host_check;
pub mod manifest;
pub mod pull;
pub mod reconcile;
pub mod services;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types
pub use channel::{persist_channel, resolve_channel, ChannelSelection, ChannelSource};
pub use container::{ByteStream, ContainerRuntime, DockerEngine};
pub use export::Exporter;
pub use host_check::{is_elevated, require_elevated};
pub use manifest::ManifestResolver;
pub use pull::{ImagePuller, PullResult};
pub use services::{ServiceManager, Systemctl};
pub use update::{UpdateReport, Updater};
