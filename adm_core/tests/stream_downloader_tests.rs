use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use adm_core::downloader::retry::ArtifactFetcher;
use adm_core::downloader::stream_downloader::{StreamingDownloader, StreamingFetcher};
use adm_core::progress::{ProgressObserver, ProgressSample};
use adm_core::tasks::ActiveDownloads;
use adm_core::types::types::{DownloadError, TaskState};

/// Generates deterministic test data.
fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Minimal HTTP server that paces the body out in fixed-size chunks with a
/// delay between them, so throttling and cancellation are observable.
/// `declared_len` lets a test lie about the content-length and drop the
/// connection early.
async fn paced_server(
    body: Vec<u8>,
    chunk_size: usize,
    delay: Duration,
    declared_len: Option<usize>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let declared = declared_len.unwrap_or(body.len());

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
            declared
        );
        if socket.write_all(header.as_bytes()).await.is_err() {
            return;
        }

        for chunk in body.chunks(chunk_size) {
            if socket.write_all(chunk).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(delay).await;
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{}/file", addr)
}

/// Records everything the notifier delivers.
#[derive(Clone, Default)]
struct RecordingObserver {
    samples: Arc<Mutex<Vec<ProgressSample>>>,
    completed: Arc<Mutex<Option<ProgressSample>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ProgressObserver for RecordingObserver {
    async fn on_progress(&self, sample: &ProgressSample) {
        self.samples.lock().unwrap().push(sample.clone());
    }

    async fn on_complete(&self, sample: &ProgressSample) {
        *self.completed.lock().unwrap() = Some(sample.clone());
    }

    async fn on_error(&self, error: &str) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[tokio::test]
async fn test_download_writes_exact_bytes_and_finishes_at_100() {
    let body = generate_test_data(256 * 1024);
    let url = paced_server(body.clone(), 32 * 1024, Duration::from_millis(10), None).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bundle.bin");

    let observer = RecordingObserver::default();
    let mut downloader = StreamingDownloader::new(url, destination.clone())
        .with_throttle(Duration::from_millis(50));
    downloader.add_observer(Box::new(observer.clone()));

    let path = downloader.download().await.unwrap();
    assert_eq!(path, destination);
    assert_eq!(downloader.task().state, TaskState::Completed);
    assert_eq!(downloader.task().bytes_downloaded, body.len() as u64);

    let written = std::fs::read(&destination).unwrap();
    assert_eq!(written, body, "file content should match byte-for-byte");

    let completed = observer.completed.lock().unwrap().clone().unwrap();
    assert_eq!(completed.percent, 100);
    assert_eq!(completed.bytes_downloaded, body.len() as u64);
    assert_eq!(completed.total_bytes, Some(body.len() as u64));
}

#[tokio::test]
async fn test_intermediate_progress_caps_at_99_and_is_throttled() {
    // ~10 chunks at 50ms each: a ~500ms transfer with a 200ms cadence can
    // produce at most a few intermediate samples.
    let body = generate_test_data(500 * 1024);
    let url = paced_server(body.clone(), 50 * 1024, Duration::from_millis(50), None).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bundle.bin");

    let observer = RecordingObserver::default();
    let mut downloader = StreamingDownloader::new(url, destination)
        .with_throttle(Duration::from_millis(200));
    downloader.add_observer(Box::new(observer.clone()));

    downloader.download().await.unwrap();

    let samples = observer.samples.lock().unwrap();
    let intermediate: Vec<_> = samples.iter().filter(|s| s.percent < 100).collect();
    assert!(
        intermediate.len() <= 4,
        "throttle should bound intermediate samples, got {}",
        intermediate.len()
    );
    for sample in &intermediate {
        assert!(sample.percent <= 99, "percent must cap at 99 mid-transfer");
        assert_eq!(sample.total_bytes, Some(body.len() as u64));
    }

    // Bytes counts never go backwards.
    let mut previous = 0;
    for sample in samples.iter() {
        assert!(sample.bytes_downloaded >= previous);
        previous = sample.bytes_downloaded;
    }
}

#[tokio::test]
async fn test_chunked_declared_length_scenario() {
    // Scaled rendition of the 50MB/1MB-chunk scenario: a declared
    // content-length payload arriving in fixed chunks must end on exactly
    // 100% with the full byte count.
    let total = 5 * 1024 * 1024;
    let body = generate_test_data(total);
    let url = paced_server(body.clone(), 512 * 1024, Duration::from_millis(30), None).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("update.exe");

    let observer = RecordingObserver::default();
    let mut downloader = StreamingDownloader::new(url, destination.clone())
        .with_throttle(Duration::from_millis(100));
    downloader.add_observer(Box::new(observer.clone()));

    downloader.download().await.unwrap();

    let completed = observer.completed.lock().unwrap().clone().unwrap();
    assert_eq!(completed.percent, 100);
    assert_eq!(completed.bytes_downloaded, total as u64);
    assert_eq!(
        std::fs::metadata(&destination).unwrap().len(),
        total as u64
    );
}

#[tokio::test]
async fn test_cancel_leaves_no_partial_file() {
    let body = generate_test_data(1024 * 1024);
    let url = paced_server(body, 64 * 1024, Duration::from_millis(100), None).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bundle.bin");

    let mut downloader = StreamingDownloader::new(url, destination.clone());
    let token = downloader.cancel_token();

    let handle = tokio::spawn(async move { downloader.download().await });

    tokio::time::sleep(Duration::from_millis(250)).await;
    token.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(
        !destination.exists(),
        "no partial file may remain after cancellation settles"
    );
}

#[tokio::test]
async fn test_midstream_failure_removes_partial_file() {
    // The server declares 1MB but delivers 128KB and drops the connection.
    let body = generate_test_data(128 * 1024);
    let url = paced_server(
        body,
        32 * 1024,
        Duration::from_millis(10),
        Some(1024 * 1024),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bundle.bin");

    let observer = RecordingObserver::default();
    let mut downloader = StreamingDownloader::new(url, destination.clone());
    downloader.add_observer(Box::new(observer.clone()));

    let result = downloader.download().await;
    assert!(matches!(result, Err(DownloadError::Transport(_))));
    assert!(
        !destination.exists(),
        "partial file must be deleted before the error propagates"
    );
    assert_eq!(observer.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pause_suspends_progress_emission() {
    let body = generate_test_data(256 * 1024);
    let url = paced_server(body.clone(), 32 * 1024, Duration::from_millis(20), None).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bundle.bin");

    let observer = RecordingObserver::default();
    let mut downloader = StreamingDownloader::new(url, destination.clone())
        .with_throttle(Duration::from_millis(20));
    downloader.add_observer(Box::new(observer.clone()));

    // Advisory pause: bytes keep flowing, progress reporting does not.
    downloader.pause_handle().pause();
    downloader.download().await.unwrap();

    assert!(
        observer.samples.lock().unwrap().is_empty(),
        "paused transfer must not emit intermediate samples"
    );
    // The transfer itself still completed in full.
    let completed = observer.completed.lock().unwrap().clone().unwrap();
    assert_eq!(completed.percent, 100);
    assert_eq!(std::fs::read(&destination).unwrap(), body);
}

#[tokio::test]
async fn test_streaming_fetcher_enforces_single_flight() {
    let registry = Arc::new(ActiveDownloads::new());
    registry.register("app-1").unwrap();

    let fetcher = StreamingFetcher::new("app-1", Arc::clone(&registry));
    let result = fetcher
        .fetch_artifact("http://127.0.0.1:1/unreachable", &PathBuf::from("out.bin"))
        .await;

    assert!(matches!(result, Err(DownloadError::TaskAlreadyActive(id)) if id == "app-1"));
}
