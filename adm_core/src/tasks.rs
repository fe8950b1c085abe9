use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::types::TaskState;

/// A single transfer in flight. Owned exclusively by the
/// `StreamingDownloader` driving it; other layers see only the task id and
/// the cancellation token registered in [`ActiveDownloads`].
#[derive(Debug)]
pub struct DownloadTask {
    pub id: String,
    pub source_url: String,
    pub destination_path: PathBuf,
    pub state: TaskState,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub started_at: Option<Instant>,
}

impl DownloadTask {
    pub fn new(source_url: impl Into<String>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            state: TaskState::Pending,
            bytes_downloaded: 0,
            total_bytes: None,
            started_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TaskState::Cancelled | TaskState::Completed | TaskState::Failed
        )
    }
}

/// Registry of in-flight downloads, keyed by caller-chosen task identity
/// (an app id, or a fixed key for the self-update flow).
///
/// Owned by the orchestrating layer and passed by reference into the code
/// that starts downloads — deliberately not process-wide ambient state.
/// Registering an identity that is already in flight is refused; that is how
/// "one active download per task identity" is enforced.
pub struct ActiveDownloads {
    inner: Mutex<HashMap<String, CancellationToken>>,
}

impl ActiveDownloads {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new in-flight download and hand back its cancellation
    /// token. Returns `None` when the identity already has a transfer in
    /// flight.
    pub fn register(&self, key: &str) -> Option<CancellationToken> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(key) {
            return None;
        }
        let token = CancellationToken::new();
        map.insert(key.to_string(), token.clone());
        Some(token)
    }

    /// Signal cancellation for an in-flight download. Returns whether the
    /// identity was known. The entry stays registered until the transfer
    /// settles and calls [`ActiveDownloads::finish`].
    pub fn cancel(&self, key: &str) -> bool {
        let map = self.inner.lock().unwrap();
        match map.get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a settled transfer from the registry.
    pub fn finish(&self, key: &str) {
        let mut map = self.inner.lock().unwrap();
        map.remove(key);
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActiveDownloads {
    fn default() -> Self {
        Self::new()
    }
}
