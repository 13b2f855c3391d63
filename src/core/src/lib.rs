//! platconf core - foundational types for the appliance update orchestrator.
//!
//! This crate holds the types shared by the update engine and the CLI:
//! the release manifest model, the update configuration, the error
//! taxonomy and the status sink abstraction.

pub mod config;
pub mod error;
pub mod manifest;
pub mod status;

// Re-export commonly used types
pub use config::{LogFormat, UpdateConfig};
pub use error::{
    ExportError, ManifestError, PullError, ReconcileError, Result, RuntimeError, ServiceError,
    UpdateError,
};
pub use manifest::{ImageRef, ReleaseManifest};
pub use status::{LogStatusSink, NoopStatusSink, Phase, Status, StatusSink};

/// platconf version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
