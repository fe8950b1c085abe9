use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A validated self-update artifact staged for installation.
///
/// Survives process restarts; at most one exists at a time (the store holds
/// a single record). Consumed and deleted by the installer on any completed
/// installation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    pub file_path: PathBuf,
    pub target_version: String,
    /// Unix seconds at staging time.
    pub downloaded_at: u64,
    pub source_url: String,
    pub file_size_bytes: u64,
}

impl PendingUpdate {
    pub fn new(
        file_path: impl Into<PathBuf>,
        target_version: impl Into<String>,
        source_url: impl Into<String>,
        file_size_bytes: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            target_version: target_version.into(),
            downloaded_at: unix_seconds_now(),
            source_url: source_url.into(),
            file_size_bytes,
        }
    }
}

pub fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Durable single-record store for the pending update, kept as one JSON
/// file under the per-user state directory.
pub struct UpdateStore {
    path: PathBuf,
}

impl UpdateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<local data dir>/adm/pending_update.json`.
    pub fn default_location() -> Result<Self, io::Error> {
        let base = dirs_next::data_local_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no local data directory available")
        })?;
        Ok(Self::new(base.join("adm").join("pending_update.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means no pending update. A record that no longer
    /// parses is treated the same way (and logged) — a corrupt store must
    /// not wedge the updater.
    pub async fn load(&self) -> Result<Option<PendingUpdate>, io::Error> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!(
                    "pending-update record at {} is corrupt ({}), ignoring it",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Replace the record. Written to a sibling temp file first and renamed
    /// into place so a crash never leaves a half-written record.
    pub async fn save(&self, record: &PendingUpdate) -> Result<(), io::Error> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_vec_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        log::info!(
            "staged update {} recorded at {}",
            record.target_version,
            self.path.display()
        );
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), io::Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
