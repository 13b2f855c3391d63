use std::path::PathBuf;

use thiserror::Error;

/// Errors from fetching and decoding a release manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The channel has no manifest
    #[error("no such channel: '{channel}'")]
    NotFound { channel: String },

    /// The manifest body is not valid JSON for the manifest schema
    #[error("malformed manifest: {0}")]
    Decode(#[from] serde_json::Error),

    /// The manifest store answered with an unexpected status
    #[error("manifest request to {url} returned status {status}")]
    Transport { url: String, status: u16 },

    /// The request never produced a response
    #[error("manifest request failed: {0}")]
    Http(String),

    /// The manifest decoded but violates a manifest invariant
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// Errors from talking to the container runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime socket could not be reached
    #[error("cannot connect to container runtime at {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP-level failure on the runtime connection
    #[error("container runtime request failed: {0}")]
    Http(String),

    /// The runtime rejected a request
    #[error("container runtime returned {status} for {endpoint}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The runtime answered with something we could not interpret
    #[error("invalid container runtime response: {0}")]
    InvalidResponse(String),

    /// I/O error while streaming a response body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from pulling images.
#[derive(Error, Debug)]
pub enum PullError {
    /// The progress stream carried an error event
    #[error("pulling '{image}' failed: {message}")]
    Registry { image: String, message: String },

    /// The progress stream carried something that is not a progress message
    #[error("malformed progress message while pulling '{image}': {message}")]
    Decode { image: String, message: String },

    /// The progress stream ended in the middle of a JSON value
    #[error("progress stream for '{image}' ended unexpectedly")]
    UnexpectedEof { image: String },

    /// The pull request itself failed
    #[error("pulling '{image}' failed: {source}")]
    Runtime {
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// A pool of zero workers can never finish
    #[error("the maximum number of pullers must be > 0")]
    InvalidConcurrency,

    /// A worker task panicked or was aborted
    #[error("pull worker failed: {0}")]
    Worker(String),
}

impl PullError {
    /// Name of the image whose pull failed, if the error belongs to one.
    pub fn image(&self) -> Option<&str> {
        match self {
            PullError::Registry { image, .. }
            | PullError::Decode { image, .. }
            | PullError::UnexpectedEof { image }
            | PullError::Runtime { image, .. } => Some(image),
            PullError::InvalidConcurrency | PullError::Worker(_) => None,
        }
    }
}

/// Errors from exporting a container filesystem and extracting it.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The ephemeral container could not be created
    #[error("failed to create container from '{reference}': {source}")]
    Create {
        reference: String,
        #[source]
        source: RuntimeError,
    },

    /// The runtime failed to produce the filesystem archive
    #[error("failed to export container {container}: {source}")]
    Export {
        container: String,
        #[source]
        source: RuntimeError,
    },

    /// The archive could not be materialized on disk
    #[error("failed to extract archive into {}: {message}", path.display())]
    Extract { path: PathBuf, message: String },

    /// The ephemeral container could not be removed
    #[error("failed to remove container {container}: {source}")]
    Remove {
        container: String,
        #[source]
        source: RuntimeError,
    },

    /// A pipeline task panicked
    #[error("export task failed: {0}")]
    Task(String),
}

/// Errors from the filesystem reconciler.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Every reconciler path must be absolute
    #[error("a relative path was given: {}", .0.display())]
    RelativePath(PathBuf),

    /// The operation only accepts regular files
    #[error("{} is not a regular file", .0.display())]
    NotRegularFile(PathBuf),

    /// A template references an image the manifest does not list
    #[error("image '{image}' referenced by {} is not in the manifest", path.display())]
    UnresolvedImage { image: String, path: PathBuf },

    /// Filesystem operation failed
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReconcileError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconcileError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Errors from service manager calls.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The command could not be started
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and reported failure
    #[error("{command} failed: {message}")]
    Failed { command: String, message: String },
}

/// Top-level error of an update run.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The process lacks root privileges
    #[error("this command must be run as root")]
    Privilege,

    /// Manifest resolution failed
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The manifest lists no configure image
    #[error("configure image data not found in the manifest: '{0}'")]
    ConfigureImageMissing(String),

    /// Image pull failed
    #[error(transparent)]
    Pull(#[from] PullError),

    /// Configure image export failed
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Filesystem reconciliation failed
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Service manager call failed
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for UpdateError {
    fn from(err: serde_yaml::Error) -> Self {
        UpdateError::Config(err.to_string())
    }
}

/// Result type alias for update operations
pub type Result<T> = std::result::Result<T, UpdateError>;
