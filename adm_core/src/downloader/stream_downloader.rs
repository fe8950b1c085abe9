use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::progress::{ProgressNotifier, ProgressObserver, ProgressSample};
use crate::tasks::DownloadTask;
use crate::types::types::{DownloadError, TaskState, TransportError};

use super::transport::Transport;

/// Progress cadence for app-bundle downloads.
pub const APP_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Progress cadence for self-update downloads.
pub const SELF_UPDATE_PROGRESS_INTERVAL: Duration = Duration::from_millis(1000);

const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Streams one HTTP resource to disk.
///
/// Owns its [`DownloadTask`] for the lifetime of the transfer. Chunks go
/// straight from the response stream into a buffered file writer; the stream
/// is never polled while a write is in flight, so a slow disk suspends the
/// socket instead of growing an in-memory backlog.
pub struct StreamingDownloader {
    transport: Transport,
    notifier: ProgressNotifier,
    task: DownloadTask,
    cancel_token: CancellationToken,
    paused: Arc<AtomicBool>,
    throttle: Duration,
    extra_headers: HashMap<String, String>,
}

impl StreamingDownloader {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            transport: Transport::new(),
            notifier: ProgressNotifier::new(),
            task: DownloadTask::new(url.into(), destination.into()),
            cancel_token: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(false)),
            throttle: APP_PROGRESS_INTERVAL,
            extra_headers: HashMap::new(),
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Drive the transfer from an externally owned token (e.g. one held in
    /// an `ActiveDownloads` registry) instead of the internal default.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    /// Register a progress observer. Must be called before `download()`.
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.notifier.add_observer(observer);
    }

    pub fn task(&self) -> &DownloadTask {
        &self.task
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Advisory pause: suspends progress emission while bytes keep flowing.
    /// True stop-and-resume of the byte transfer would need server Range
    /// support and is a different feature.
    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle {
            paused: Arc::clone(&self.paused),
        }
    }

    /// Run the full transfer and return the destination path.
    ///
    /// On any failure — transport, disk, or cancellation — the partially
    /// written destination file is deleted before the error is returned.
    /// Cancellation surfaces as `DownloadError::Cancelled` and is terminal
    /// here; retry policy belongs to the retry coordinator.
    pub async fn download(&mut self) -> Result<PathBuf, DownloadError> {
        let (progress_tx, progress_rx) = mpsc::channel(256);

        // Take the notifier out so we can move it into the background task.
        // A fresh empty notifier is left in place so the field stays valid.
        let notifier = std::mem::replace(&mut self.notifier, ProgressNotifier::new());
        let notifier_handle = tokio::spawn(async move {
            notifier.run(progress_rx).await;
        });

        let result = self.transfer(&progress_tx).await;

        if let Err(err) = &result {
            // Cleanup must finish before the failure settles: no partial
            // file may remain at the destination.
            self.remove_partial().await;
            self.task.state = match err {
                DownloadError::Cancelled => TaskState::Cancelled,
                _ => TaskState::Failed,
            };
            let _ = progress_tx.send(Err(err.to_string())).await;
        }

        // Close the channel so the notifier can finish and exit cleanly.
        drop(progress_tx);
        let _ = notifier_handle.await;

        result
    }

    async fn transfer(
        &mut self,
        progress_tx: &mpsc::Sender<Result<ProgressSample, String>>,
    ) -> Result<PathBuf, DownloadError> {
        self.task.state = TaskState::InProgress;
        self.task.started_at = Some(Instant::now());

        let fetched = self
            .transport
            .fetch(&self.task.source_url, &self.extra_headers)
            .await?;
        self.task.total_bytes = fetched.content_length;
        log::info!(
            "downloading {} -> {} ({} declared)",
            fetched.final_url,
            self.task.destination_path.display(),
            fetched
                .content_length
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown size".into()),
        );

        let file = tokio::fs::File::create(&self.task.destination_path)
            .await
            .map_err(DownloadError::Disk)?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let mut stream = fetched.into_stream();
        let mut last_sample_at = Instant::now();
        let mut bytes_at_last_sample: u64 = 0;

        loop {
            // The abort signal interrupts an in-flight read; it must not have
            // to wait for the next chunk to arrive.
            let chunk_result = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    let _ = writer.flush().await;
                    drop(writer);
                    return Err(DownloadError::Cancelled);
                }
                next = stream.next() => match next {
                    Some(chunk_result) => chunk_result,
                    None => break,
                },
            };

            let chunk = chunk_result
                .map_err(|e| DownloadError::Transport(TransportError::from_reqwest(e)))?;

            writer.write_all(&chunk).await.map_err(DownloadError::Disk)?;
            self.task.bytes_downloaded += chunk.len() as u64;

            if self.paused.load(Ordering::Relaxed) {
                self.task.state = TaskState::Paused;
                continue;
            }
            if self.task.state == TaskState::Paused {
                self.task.state = TaskState::InProgress;
            }

            // Throttled emission: at most one sample per interval.
            let now = Instant::now();
            let elapsed = now.duration_since(last_sample_at);
            if elapsed >= self.throttle {
                let sample = self.build_sample(
                    self.task.bytes_downloaded - bytes_at_last_sample,
                    elapsed.as_secs_f64(),
                );
                let _ = progress_tx.try_send(Ok(sample));
                last_sample_at = now;
                bytes_at_last_sample = self.task.bytes_downloaded;
            }
        }

        writer.flush().await.map_err(DownloadError::Disk)?;
        drop(writer);

        self.task.state = TaskState::Completed;
        let final_sample =
            ProgressSample::completed(self.task.bytes_downloaded, self.task.total_bytes);
        let _ = progress_tx.send(Ok(final_sample)).await;

        log::info!(
            "download completed: {} ({} bytes)",
            self.task.destination_path.display(),
            self.task.bytes_downloaded
        );
        Ok(self.task.destination_path.clone())
    }

    /// Percent is linear bytes/total clamped to 99; only the terminal sample
    /// built by `ProgressSample::completed` reports 100.
    fn build_sample(&self, bytes_delta: u64, elapsed_secs: f64) -> ProgressSample {
        let speed_bps = if elapsed_secs > 0.0 {
            bytes_delta as f64 / elapsed_secs
        } else {
            0.0
        };

        let (percent, eta_secs) = match self.task.total_bytes {
            Some(total) if total > 0 => {
                let pct = (self.task.bytes_downloaded * 100 / total).min(99) as u8;
                let remaining = total.saturating_sub(self.task.bytes_downloaded);
                let eta = remaining as f64 / speed_bps;
                let eta = if eta.is_finite() && speed_bps > 0.0 {
                    Some(eta.round() as u64)
                } else {
                    None
                };
                (pct, eta)
            }
            _ => (0, None),
        };

        ProgressSample {
            bytes_downloaded: self.task.bytes_downloaded,
            total_bytes: self.task.total_bytes,
            speed_bps,
            eta_secs,
            percent,
        }
    }

    async fn remove_partial(&self) {
        match tokio::fs::remove_file(&self.task.destination_path).await {
            Ok(()) => log::debug!(
                "removed partial file {}",
                self.task.destination_path.display()
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "could not remove partial file {}: {}",
                self.task.destination_path.display(),
                e
            ),
        }
    }
}

/// Clonable handle controlling advisory pause for a transfer in flight.
#[derive(Clone)]
pub struct PauseHandle {
    paused: Arc<AtomicBool>,
}

impl PauseHandle {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

/// [`crate::downloader::retry::ArtifactFetcher`] backed by a fresh
/// `StreamingDownloader` per attempt, registered in an [`ActiveDownloads`]
/// registry under a caller-chosen identity.
///
/// [`ActiveDownloads`]: crate::tasks::ActiveDownloads
pub struct StreamingFetcher {
    registry: Arc<crate::tasks::ActiveDownloads>,
    identity: String,
    throttle: Duration,
    observer_factory: Option<Box<dyn Fn() -> Box<dyn ProgressObserver> + Send + Sync>>,
}

impl StreamingFetcher {
    pub fn new(identity: impl Into<String>, registry: Arc<crate::tasks::ActiveDownloads>) -> Self {
        Self {
            registry,
            identity: identity.into(),
            throttle: APP_PROGRESS_INTERVAL,
            observer_factory: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Observers are rebuilt per attempt so each retry gets a fresh one.
    pub fn with_observer_factory(
        mut self,
        factory: impl Fn() -> Box<dyn ProgressObserver> + Send + Sync + 'static,
    ) -> Self {
        self.observer_factory = Some(Box::new(factory));
        self
    }
}

#[async_trait::async_trait]
impl super::retry::ArtifactFetcher for StreamingFetcher {
    async fn fetch_artifact(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let token = self
            .registry
            .register(&self.identity)
            .ok_or_else(|| DownloadError::TaskAlreadyActive(self.identity.clone()))?;

        let mut downloader = StreamingDownloader::new(url, destination)
            .with_throttle(self.throttle)
            .with_cancel_token(token);
        if let Some(factory) = &self.observer_factory {
            downloader.add_observer(factory());
        }

        let result = downloader.download().await;
        self.registry.finish(&self.identity);
        result
    }
}
