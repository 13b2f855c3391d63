//! Update status reporting.
//!
//! The orchestrator reports coarse progress to a [`StatusSink`]. Sinks are
//! fire-and-forget: a sink handles its own failures (typically by logging
//! them) and never fails the update.

use serde::{Deserialize, Serialize};

/// Phase of an update run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preparing,
    Resolving,
    Downloading,
    Finalizing,
    Done,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Preparing => "preparing",
            Phase::Resolving => "resolving",
            Phase::Downloading => "downloading",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

/// A status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Current phase
    #[serde(rename = "status")]
    pub phase: Phase,

    /// Fraction of the phase completed, in `0.0..=1.0`
    pub progress: Option<f32>,

    /// What is being worked on
    pub what: Option<String>,

    /// Timestamp
    #[serde(skip_deserializing, default = "chrono::Utc::now")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Status {
    /// Create a status with no progress information
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            progress: None,
            what: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach a progress fraction
    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress.clamp(0.0, 1.0));
        self
    }

    /// Attach a description of the current item
    pub fn with_what(mut self, what: impl Into<String>) -> Self {
        self.what = Some(what.into());
        self
    }
}

/// Receiver of status updates.
pub trait StatusSink: Send + Sync {
    /// Deliver a status update. Must not block for long and must not panic.
    fn notify(&self, status: &Status);
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn notify(&self, _status: &Status) {}
}

/// Sink that writes every update to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn notify(&self, status: &Status) {
        tracing::info!(
            status = %status.phase,
            progress = ?status.progress,
            what = ?status.what,
            "Update status"
        );
    }
}
