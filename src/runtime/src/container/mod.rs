//! Container runtime abstraction.
//!
//! The update engine needs four things from a container runtime: pull an
//! image while streaming progress, create a container that is never started,
//! stream that container's filesystem as a tar archive, and remove it again.
//!
//! ```text
//! ┌──────────────┐  pull_image      ┌──────────────────┐
//! │ ImagePuller  │ ───────────────▶ │                  │
//! └──────────────┘                  │ ContainerRuntime │
//! ┌──────────────┐  create/export/  │   (DockerEngine) │
//! │   Exporter   │ ───────────────▶ │                  │
//! └──────────────┘  remove          └──────────────────┘
//! ```

mod docker;

use async_trait::async_trait;
use futures::stream::BoxStream;
use hyper::body::Bytes;

use platconf_core::error::RuntimeError;

pub use docker::DockerEngine;

/// Stream of response body chunks from the runtime.
pub type ByteStream = BoxStream<'static, Result<Bytes, RuntimeError>>;

/// Operations the update engine consumes from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull `name:tag`, returning the raw progress stream (concatenated JSON
    /// objects). The pull is complete once the stream ends.
    async fn pull_image(&self, name: &str, tag: &str) -> Result<ByteStream, RuntimeError>;

    /// Create a container from `reference` without starting it. Returns its ID.
    async fn create_container(&self, reference: &str) -> Result<String, RuntimeError>;

    /// Stream the container's filesystem as a tar archive.
    async fn export_container(&self, id: &str) -> Result<ByteStream, RuntimeError>;

    /// Remove a container.
    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<(), RuntimeError>;
}
