use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::types::types::{ArtifactKind, DownloadError, RetryError};
use crate::validator;

/// Attempt budget for the self-update flow.
pub const SELF_UPDATE_MAX_ATTEMPTS: u32 = 5;

/// Attempt budget for app-bundle downloads.
pub const APP_MAX_ATTEMPTS: u32 = 3;

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 10_000;

/// The download step, abstracted so the retry loop can be exercised without
/// a network (and so callers can wire observers per attempt).
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch_artifact(&self, url: &str, destination: &Path)
        -> Result<PathBuf, DownloadError>;
}

/// `min(10s, 2^attempt seconds)` — {2s, 4s, 8s, 10s, 10s} for attempts 1..=5.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(BACKOFF_CAP_MS))
}

enum AttemptFailure {
    Download(DownloadError),
    Invalid(String),
}

/// Drives download-then-validate attempts until a validated artifact exists
/// or the attempt budget runs out.
pub struct RetryCoordinator {
    max_attempts: u32,
    kind: ArtifactKind,
}

impl RetryCoordinator {
    pub fn new(max_attempts: u32, kind: ArtifactKind) -> Self {
        Self { max_attempts, kind }
    }

    pub fn for_self_update() -> Self {
        Self::new(SELF_UPDATE_MAX_ATTEMPTS, ArtifactKind::SelfUpdate)
    }

    pub fn for_app_download() -> Self {
        Self::new(APP_MAX_ATTEMPTS, ArtifactKind::Installer)
    }

    /// Download and validate until an approved artifact exists at
    /// `destination`, retrying with capped exponential backoff.
    ///
    /// Invalid artifacts are deleted before the next attempt. A validator
    /// I/O failure (file unreadable) counts as an invalid artifact. A
    /// successful validation short-circuits the remaining attempts.
    /// Cancellation is surfaced immediately — a user abort must never
    /// trigger a background re-download.
    pub async fn acquire_validated_artifact<F>(
        &self,
        fetcher: &F,
        url: &str,
        destination: &Path,
    ) -> Result<PathBuf, RetryError>
    where
        F: ArtifactFetcher + ?Sized,
    {
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 1..=self.max_attempts {
            log::info!(
                "download attempt {}/{} for {}",
                attempt,
                self.max_attempts,
                url
            );

            match fetcher.fetch_artifact(url, destination).await {
                Ok(path) => {
                    let reason = match validator::validate(&path, self.kind).await {
                        Ok(result) if result.valid => {
                            log::info!("artifact validated: {}", path.display());
                            return Ok(path);
                        }
                        Ok(result) => result
                            .reason
                            .unwrap_or_else(|| "artifact rejected".to_string()),
                        // Unreadable file is handled exactly like an invalid one.
                        Err(e) => format!("artifact unreadable: {}", e),
                    };

                    log::warn!("attempt {} produced invalid artifact: {}", attempt, reason);
                    remove_artifact(&path).await;
                    last_failure = Some(AttemptFailure::Invalid(reason));
                }
                Err(DownloadError::Cancelled) => return Err(RetryError::Cancelled),
                Err(e) => {
                    log::warn!("attempt {} failed to download: {}", attempt, e);
                    last_failure = Some(AttemptFailure::Download(e));
                }
            }

            if attempt < self.max_attempts {
                let delay = backoff_delay(attempt);
                log::debug!("waiting {:?} before retry", delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(match last_failure {
            Some(AttemptFailure::Invalid(reason)) => RetryError::ValidationExhausted {
                attempts: self.max_attempts,
                reason,
            },
            Some(AttemptFailure::Download(source)) => RetryError::DownloadExhausted {
                attempts: self.max_attempts,
                source,
            },
            // max_attempts >= 1 always produces a failure before reaching here
            None => RetryError::ValidationExhausted {
                attempts: self.max_attempts,
                reason: "no download attempts were made".to_string(),
            },
        })
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove rejected artifact {}: {}", path.display(), e),
    }
}
