//! Shared helpers for scheduler tests.
//!
//! The three external collaborators are replaced with hand-rolled mocks whose
//! completion is driven explicitly by the test, so tests control exactly when
//! a download or upload finishes without any real I/O or sleeps.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::external::{
    Destination, DownloadedFile, MediaFetcher, MediaUploader, Notification, Notifier,
    ProgressSample, ProgressSender,
};
use crate::scheduler::MediaScheduler;
use crate::types::{DownloadRequest, TaskId, TaskState, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// One fetch currently blocked inside the mock, waiting for the test.
struct InFlightFetch {
    done: oneshot::Sender<std::result::Result<u64, String>>,
    progress: ProgressSender,
}

/// Fetcher whose downloads hang until the test completes or fails them.
pub(crate) struct MockFetcher {
    in_flight: Mutex<HashMap<String, InFlightFetch>>,
    dir: tempfile::TempDir,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Poll until a fetch for `url` has started, up to 2 seconds.
    pub(crate) async fn wait_in_flight(&self, url: &str) {
        for _ in 0..400 {
            if self.in_flight.lock().expect("mock lock").contains_key(url) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no fetch started for {url} within 2s");
    }

    /// Whether a fetch for `url` is currently blocked in the mock.
    pub(crate) fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.lock().expect("mock lock").contains_key(url)
    }

    /// Let the fetch for `url` succeed with an artifact of `size` bytes.
    pub(crate) fn complete(&self, url: &str, size: u64) {
        let entry = self
            .in_flight
            .lock()
            .expect("mock lock")
            .remove(url)
            .unwrap_or_else(|| panic!("no in-flight fetch for {url}"));
        entry.done.send(Ok(size)).expect("fetch receiver alive");
    }

    /// Let the fetch for `url` fail with `reason`.
    pub(crate) fn fail(&self, url: &str, reason: &str) {
        let entry = self
            .in_flight
            .lock()
            .expect("mock lock")
            .remove(url)
            .unwrap_or_else(|| panic!("no in-flight fetch for {url}"));
        entry
            .done
            .send(Err(reason.to_string()))
            .expect("fetch receiver alive");
    }

    /// Push one raw progress sample through the fetch for `url`.
    pub(crate) async fn push_progress(&self, url: &str, bytes_done: u64, bytes_total: u64) {
        let sender = {
            let in_flight = self.in_flight.lock().expect("mock lock");
            in_flight
                .get(url)
                .unwrap_or_else(|| panic!("no in-flight fetch for {url}"))
                .progress
                .clone()
        };
        sender
            .send(ProgressSample {
                bytes_done,
                bytes_total,
            })
            .await
            .expect("progress pump alive");
    }
}

#[async_trait::async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile> {
        let (done_tx, done_rx) = oneshot::channel();
        self.in_flight.lock().expect("mock lock").insert(
            request.url.clone(),
            InFlightFetch {
                done: done_tx,
                progress,
            },
        );

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                self.in_flight.lock().expect("mock lock").remove(&request.url);
                return Err(Error::Fetch("cancelled".to_string()));
            }
            res = done_rx => res,
        };

        match outcome {
            Ok(Ok(size)) => Ok(DownloadedFile {
                path: self.dir.path().join("artifact.bin"),
                size_bytes: size,
            }),
            Ok(Err(reason)) => Err(Error::Fetch(reason)),
            Err(_) => Err(Error::Fetch("test harness dropped the fetch".to_string())),
        }
    }
}

/// What the mock uploader does with each call.
pub(crate) enum UploadBehavior {
    /// Succeed immediately.
    Instant,
    /// Fail immediately with this reason.
    Fail(String),
    /// Block until [`MockUploader::release_all`] or cancellation.
    Hold,
}

/// One finished (or attempted) upload as seen by the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UploadRecord {
    pub(crate) owner: UserId,
    pub(crate) destination: Destination,
    pub(crate) size_bytes: u64,
}

/// Uploader recording every call; behavior switchable per test.
pub(crate) struct MockUploader {
    behavior: Mutex<UploadBehavior>,
    pub(crate) records: Mutex<Vec<UploadRecord>>,
    release: tokio::sync::Notify,
}

impl MockUploader {
    pub(crate) fn new() -> Self {
        Self {
            behavior: Mutex::new(UploadBehavior::Instant),
            records: Mutex::new(Vec::new()),
            release: tokio::sync::Notify::new(),
        }
    }

    pub(crate) fn set_behavior(&self, behavior: UploadBehavior) {
        *self.behavior.lock().expect("mock lock") = behavior;
    }

    /// Unblock every upload currently held by [`UploadBehavior::Hold`].
    pub(crate) fn release_all(&self) {
        self.release.notify_waiters();
    }

    pub(crate) fn recorded(&self) -> Vec<UploadRecord> {
        self.records.lock().expect("mock lock").clone()
    }
}

#[async_trait::async_trait]
impl MediaUploader for MockUploader {
    async fn upload(
        &self,
        owner: UserId,
        file: &DownloadedFile,
        destination: Destination,
        _progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<()> {
        let held = matches!(*self.behavior.lock().expect("mock lock"), UploadBehavior::Hold);
        if held {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Upload("cancelled".to_string())),
                _ = self.release.notified() => {}
            }
        }

        match &*self.behavior.lock().expect("mock lock") {
            UploadBehavior::Fail(reason) => Err(Error::Upload(reason.clone())),
            _ => {
                self.records.lock().expect("mock lock").push(UploadRecord {
                    owner,
                    destination,
                    size_bytes: file.size_bytes,
                });
                Ok(())
            }
        }
    }
}

/// Notifier recording every status message it is asked to deliver.
#[derive(Default)]
pub(crate) struct MockNotifier {
    pub(crate) sent: Mutex<Vec<(UserId, Notification)>>,
}

impl MockNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sent_to(&self, user: UserId) -> Vec<Notification> {
        self.sent
            .lock()
            .expect("mock lock")
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, user: UserId, update: Notification) {
        self.sent.lock().expect("mock lock").push((user, update));
    }
}

/// A scheduler wired to the three mocks, plus handles to drive them.
pub(crate) struct TestScheduler {
    pub(crate) scheduler: MediaScheduler,
    pub(crate) fetcher: Arc<MockFetcher>,
    pub(crate) uploader: Arc<MockUploader>,
    pub(crate) notifier: Arc<MockNotifier>,
}

pub(crate) fn create_test_scheduler(config: Config) -> TestScheduler {
    let fetcher = Arc::new(MockFetcher::new());
    let uploader = Arc::new(MockUploader::new());
    let notifier = Arc::new(MockNotifier::new());
    let scheduler = MediaScheduler::new(
        config,
        fetcher.clone(),
        uploader.clone(),
        notifier.clone(),
    )
    .expect("valid test config");
    TestScheduler {
        scheduler,
        fetcher,
        uploader,
        notifier,
    }
}

/// Request with a distinct URL so mocks can be driven per task.
pub(crate) fn request(url: &str) -> DownloadRequest {
    DownloadRequest {
        url: url.to_string(),
        quality: None,
        output_format: "mp4".to_string(),
    }
}

impl MediaScheduler {
    /// Direct registry read, bypassing the pruning `status()` performs.
    pub(crate) async fn task_state(&self, id: &TaskId) -> Option<TaskState> {
        let state = self.state.lock().await;
        state.registry.get(id).map(|t| t.state)
    }
}

/// Poll until `id` reaches `expected`, up to 2 seconds.
pub(crate) async fn wait_for_state(scheduler: &MediaScheduler, id: &TaskId, expected: TaskState) {
    for _ in 0..400 {
        if scheduler.task_state(id).await == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let actual = scheduler.task_state(id).await;
    panic!("task {id} did not reach {expected} within 2s (currently {actual:?})");
}
