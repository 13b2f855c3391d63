//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use hyper::body::Bytes;
use parking_lot::Mutex;

use platconf_core::error::{RuntimeError, ServiceError};
use platconf_core::status::{Status, StatusSink};

use crate::container::{ByteStream, ContainerRuntime};
use crate::services::ServiceManager;

/// How a fake pull behaves.
#[derive(Debug, Clone)]
pub enum PullBehavior {
    /// Progress feed ending cleanly
    Succeed,
    /// Progress feed carrying an error event
    ErrorEvent(String),
    /// Progress feed cut off inside a JSON value
    Truncated,
    /// The pull request itself fails
    RequestError,
}

/// How a fake export behaves.
#[derive(Debug, Clone, Copy)]
pub enum ExportBehavior {
    /// Stream the whole archive
    Succeed,
    /// Stream this many chunks, then fail
    FailAfter(usize),
    /// The export request itself fails
    RequestError,
}

const EXPORT_CHUNK: usize = 100;

struct FakeState {
    pull_behavior: HashMap<String, PullBehavior>,
    pull_delay: HashMap<String, Duration>,
    pulled: Vec<String>,
    finished: Vec<String>,
    active: usize,
    max_active: usize,
    archive: Vec<u8>,
    export_behavior: ExportBehavior,
    create_failure: bool,
    created: Vec<String>,
    removed: Vec<(String, bool, bool)>,
}

/// [`ContainerRuntime`] serving canned pull feeds and export archives.
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                pull_behavior: HashMap::new(),
                pull_delay: HashMap::new(),
                pulled: Vec::new(),
                finished: Vec::new(),
                active: 0,
                max_active: 0,
                archive: tar_archive(&[]),
                export_behavior: ExportBehavior::Succeed,
                create_failure: false,
                created: Vec::new(),
                removed: Vec::new(),
            }),
        }
    }

    pub fn set_pull_behavior(&self, name: &str, behavior: PullBehavior) {
        self.state.lock().pull_behavior.insert(name.to_string(), behavior);
    }

    pub fn set_pull_delay(&self, name: &str, delay: Duration) {
        self.state.lock().pull_delay.insert(name.to_string(), delay);
    }

    pub fn set_archive(&self, archive: Vec<u8>) {
        self.state.lock().archive = archive;
    }

    pub fn set_export_behavior(&self, behavior: ExportBehavior) {
        self.state.lock().export_behavior = behavior;
    }

    pub fn set_create_failure(&self, fail: bool) {
        self.state.lock().create_failure = fail;
    }

    /// `name:tag` of every pull, in call order.
    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().pulled.clone()
    }

    /// `name:tag` of every pull whose request returned, in completion order.
    pub fn finished(&self) -> Vec<String> {
        self.state.lock().finished.clone()
    }

    pub fn active_pulls(&self) -> usize {
        self.state.lock().active
    }

    pub fn max_active_pulls(&self) -> usize {
        self.state.lock().max_active
    }

    /// References of every created container.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// `(id, force, remove_volumes)` of every removal.
    pub fn removed(&self) -> Vec<(String, bool, bool)> {
        self.state.lock().removed.clone()
    }
}

fn chunks(data: &[u8], size: usize) -> Vec<Result<Bytes, RuntimeError>> {
    data.chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull_image(&self, name: &str, tag: &str) -> Result<ByteStream, RuntimeError> {
        let reference = format!("{}:{}", name, tag);
        let (behavior, delay) = {
            let mut state = self.state.lock();
            state.pulled.push(reference.clone());
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
            (
                state
                    .pull_behavior
                    .get(name)
                    .cloned()
                    .unwrap_or(PullBehavior::Succeed),
                state.pull_delay.get(name).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.state.lock();
            state.active -= 1;
            state.finished.push(reference);
        }

        let feed = match behavior {
            PullBehavior::Succeed => format!(
                "{{\"status\":\"Pulling from {}\",\"id\":\"{}\"}}\r\n{{\"status\":\"Download complete\",\"id\":\"0123abcd\"}}\r\n",
                name, tag
            ),
            PullBehavior::ErrorEvent(message) => format!(
                "{{\"status\":\"Pulling from {}\"}}\r\n{{\"errorDetail\":{{\"message\":\"{}\"}},\"error\":\"{}\"}}\r\n",
                name, message, message
            ),
            PullBehavior::Truncated => "{\"status\":\"Downloading\",\"progress\":\"[==".to_string(),
            PullBehavior::RequestError => {
                return Err(RuntimeError::Status {
                    endpoint: "/images/create".to_string(),
                    status: 500,
                    message: format!("pull of {} refused", name),
                })
            }
        };

        Ok(futures::stream::iter(chunks(feed.as_bytes(), 7)).boxed())
    }

    async fn create_container(&self, reference: &str) -> Result<String, RuntimeError> {
        let mut state = self.state.lock();
        if state.create_failure {
            return Err(RuntimeError::Status {
                endpoint: "/containers/create".to_string(),
                status: 404,
                message: format!("No such image: {}", reference),
            });
        }
        state.created.push(reference.to_string());
        Ok(format!("container-{}", state.created.len()))
    }

    async fn export_container(&self, _id: &str) -> Result<ByteStream, RuntimeError> {
        let state = self.state.lock();
        let mut items = chunks(&state.archive, EXPORT_CHUNK);
        match state.export_behavior {
            ExportBehavior::Succeed => {}
            ExportBehavior::FailAfter(n) => {
                items.truncate(n);
                items.push(Err(RuntimeError::Http("connection reset by peer".to_string())));
            }
            ExportBehavior::RequestError => {
                return Err(RuntimeError::Status {
                    endpoint: "/containers/export".to_string(),
                    status: 500,
                    message: "export failed".to_string(),
                })
            }
        }
        Ok(futures::stream::iter(items).boxed())
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<(), RuntimeError> {
        self.state
            .lock()
            .removed
            .push((id.to_string(), force, remove_volumes));
        Ok(())
    }
}

/// One entry of a test archive.
pub enum ArchiveEntry<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
    Symlink(&'a str, &'a str),
    HardLink(&'a str, &'a str),
    Fifo(&'a str),
}

/// Build a tar archive from `entries`.
pub fn tar_archive(entries: &[ArchiveEntry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        match entry {
            ArchiveEntry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o700);
                header.set_size(0);
                append(&mut builder, &mut header, path, &[]);
            }
            ArchiveEntry::File(path, data) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o600);
                header.set_size(data.len() as u64);
                append(&mut builder, &mut header, path, data);
            }
            ArchiveEntry::Symlink(path, target) | ArchiveEntry::HardLink(path, target) => {
                let kind = if matches!(entry, ArchiveEntry::Symlink(..)) {
                    tar::EntryType::Symlink
                } else {
                    tar::EntryType::Link
                };
                header.set_entry_type(kind);
                header.set_mode(0o777);
                header.set_size(0);
                header.set_link_name(target).unwrap();
                append(&mut builder, &mut header, path, &[]);
            }
            ArchiveEntry::Fifo(path) => {
                header.set_entry_type(tar::EntryType::Fifo);
                header.set_mode(0o644);
                header.set_size(0);
                append(&mut builder, &mut header, path, &[]);
            }
        }
    }
    builder.into_inner().unwrap()
}

// Writes the path into the header directly so `..` entries survive.
fn append(builder: &mut tar::Builder<Vec<u8>>, header: &mut tar::Header, path: &str, data: &[u8]) {
    let name = &mut header.as_old_mut().name;
    name[..path.len()].copy_from_slice(path.as_bytes());
    header.set_cksum();
    builder.append(header, data).unwrap();
}

/// [`StatusSink`] keeping every update.
#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<Status>>,
}

impl RecordingSink {
    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().clone()
    }
}

impl StatusSink for RecordingSink {
    fn notify(&self, status: &Status) {
        self.statuses.lock().push(status.clone());
    }
}

/// [`ServiceManager`] recording its calls as command-like strings.
#[derive(Default)]
pub struct RecordingServices {
    calls: Mutex<Vec<String>>,
    fail_prefix: Option<String>,
}

impl RecordingServices {
    /// Fail every call whose recorded form starts with `prefix`.
    pub fn failing_on(prefix: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_prefix: Some(prefix.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<(), ServiceError> {
        let failed = self
            .fail_prefix
            .as_deref()
            .is_some_and(|prefix| call.starts_with(prefix));
        self.calls.lock().push(call.clone());
        if failed {
            Err(ServiceError::Failed {
                command: call,
                message: "simulated failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ServiceManager for RecordingServices {
    async fn reload_daemon(&self) -> Result<(), ServiceError> {
        self.record("daemon-reload".to_string())
    }

    async fn enable_units(&self, units: &[String]) -> Result<(), ServiceError> {
        self.record(format!("enable {}", units.join(" ")))
    }

    async fn stop_unit(&self, unit: &str) -> Result<(), ServiceError> {
        self.record(format!("stop {}", unit))
    }

    async fn restart_unit(&self, unit: &str) -> Result<(), ServiceError> {
        self.record(format!("restart {}", unit))
    }

    async fn reload_udev_rules(&self) -> Result<(), ServiceError> {
        self.record("udev-reload".to_string())
    }

    async fn reboot(&self) -> Result<(), ServiceError> {
        self.record("reboot".to_string())
    }
}
