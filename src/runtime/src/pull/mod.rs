//! Concurrent image pulls.
//!
//! A fixed pool of workers drains a shared queue of images. Each worker
//! pulls one image at a time and reports a [`PullResult`] to the collector,
//! so results arrive in completion order rather than manifest order.
//!
//! Once any pull fails the pool stops taking new images off the queue,
//! but pulls already in flight are never interrupted: the collector waits
//! for every worker to finish before it reports the first failure.

mod progress;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use platconf_core::error::PullError;
use platconf_core::manifest::ImageRef;
use platconf_core::status::{NoopStatusSink, Phase, Status, StatusSink};

use crate::container::ContainerRuntime;

pub use progress::{ProgressDecoder, ProgressMessage};

/// Outcome of pulling one image.
#[derive(Debug)]
pub struct PullResult {
    /// Image that was pulled
    pub image_name: String,
    /// `Ok` if the pull completed
    pub outcome: Result<(), PullError>,
}

/// Pulls images through a container runtime.
pub struct ImagePuller {
    runtime: Arc<dyn ContainerRuntime>,
    status: Arc<dyn StatusSink>,
}

impl ImagePuller {
    /// Create a puller with no status reporting.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            status: Arc::new(NoopStatusSink),
        }
    }

    /// Report pull progress to `sink`.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    /// Pull a single image and wait for its progress feed to end.
    pub async fn pull(&self, image: &ImageRef) -> Result<(), PullError> {
        pull_one(self.runtime.as_ref(), image).await
    }

    /// Pull every image with at most `concurrency` pulls in flight.
    ///
    /// Fails with the first error in completion order. No pull is retried.
    pub async fn pull_all(&self, images: &[ImageRef], concurrency: usize) -> Result<(), PullError> {
        if concurrency == 0 {
            return Err(PullError::InvalidConcurrency);
        }

        let total = images.len();
        if total == 0 {
            return Ok(());
        }

        tracing::info!(images = total, pullers = concurrency, "Pulling images");
        self.status
            .notify(&Status::new(Phase::Downloading).with_progress(0.0));

        let queue = Arc::new(Mutex::new(images.iter().cloned().collect::<VecDeque<_>>()));
        let aborted = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<PullResult>(total);

        let mut workers = JoinSet::new();
        for worker in 0..concurrency.min(total) {
            let runtime = Arc::clone(&self.runtime);
            let queue = Arc::clone(&queue);
            let aborted = Arc::clone(&aborted);
            let tx = tx.clone();

            workers.spawn(async move {
                loop {
                    if aborted.load(Ordering::SeqCst) {
                        break;
                    }
                    let next = queue.lock().pop_front();
                    let Some(image) = next else {
                        break;
                    };

                    tracing::debug!(worker, image = %image, "Pull started");
                    let outcome = pull_one(runtime.as_ref(), &image).await;
                    if outcome.is_err() {
                        aborted.store(true, Ordering::SeqCst);
                    }

                    let result = PullResult {
                        image_name: image.name,
                        outcome,
                    };
                    if tx.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut completed = 0;
        let mut first_error = None;
        while let Some(result) = rx.recv().await {
            completed += 1;
            match result.outcome {
                Ok(()) => {
                    tracing::info!(image = %result.image_name, "Downloading '{}': OK", result.image_name);
                    self.status.notify(
                        &Status::new(Phase::Downloading)
                            .with_progress(completed as f32 / total as f32)
                            .with_what(result.image_name.as_str()),
                    );
                }
                Err(e) => {
                    tracing::error!(
                        image = %result.image_name,
                        error = %e,
                        "Downloading '{}': FAILED",
                        result.image_name
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                first_error.get_or_insert(PullError::Worker(e.to_string()));
            }
        }

        if let Some(err) = first_error {
            let skipped = queue.lock().len();
            if skipped > 0 {
                tracing::warn!(skipped, "Skipped remaining pulls after failure");
            }
            return Err(err);
        }

        if completed != total {
            return Err(PullError::Worker(format!(
                "expected {} pull results, got {}",
                total, completed
            )));
        }

        Ok(())
    }
}

/// Pull one image, consuming its progress feed to the end.
async fn pull_one(runtime: &dyn ContainerRuntime, image: &ImageRef) -> Result<(), PullError> {
    let mut stream = runtime
        .pull_image(&image.name, &image.tag)
        .await
        .map_err(|source| PullError::Runtime {
            image: image.name.clone(),
            source,
        })?;

    let mut decoder = ProgressDecoder::new(image.name.as_str());
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| PullError::Runtime {
            image: image.name.clone(),
            source,
        })?;
        for message in decoder.feed(&chunk)? {
            tracing::trace!(
                image = %image.name,
                layer = %message.id,
                status = %message.status,
                "Pull progress"
            );
        }
    }

    decoder.finish()
}
