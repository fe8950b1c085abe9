use std::io;
use std::path::Path;
use std::time::Duration;

use crate::installer::store::UpdateStore;
use crate::installer::update_installer::BACKUP_PREFIX;

/// Backups older than this are leftovers from an interrupted install.
pub const BACKUP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Parse the unix-millis timestamp out of `adm-backup-{millis}.exe`.
/// Pure so the naming contract is testable by itself.
pub fn parse_backup_timestamp(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_prefix(BACKUP_PREFIX)?.strip_suffix(".exe")?;
    stem.parse().ok()
}

/// Delete stale backup files in `dir`. Returns how many were removed.
pub async fn sweep_stale_backups(dir: &Path, now_millis: u64) -> Result<usize, io::Error> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(timestamp) = parse_backup_timestamp(&name.to_string_lossy()) else {
            continue;
        };

        let age_millis = now_millis.saturating_sub(timestamp);
        if age_millis > BACKUP_MAX_AGE.as_millis() as u64 {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    log::info!("removed stale backup {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => log::warn!(
                    "could not remove stale backup {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }
    }

    Ok(removed)
}

/// Drop a pending-update record whose artifact file no longer exists.
/// Returns whether a dangling record was cleared.
pub async fn clear_dangling_pending(store: &UpdateStore) -> Result<bool, io::Error> {
    let Some(record) = store.load().await? else {
        return Ok(false);
    };

    if tokio::fs::metadata(&record.file_path).await.is_ok() {
        return Ok(false);
    }

    log::info!(
        "pending update {} points at missing file {}, clearing record",
        record.target_version,
        record.file_path.display()
    );
    store.clear().await?;
    Ok(true)
}

/// Startup sweep: stale backups next to the executable, the self-update
/// temp directory, and any dangling pending record. Each part is
/// best-effort; hygiene must never stop the application from starting.
pub async fn run_startup_sweep(
    exe_dir: &Path,
    update_temp_dir: &Path,
    store: &UpdateStore,
    now_millis: u64,
) {
    match sweep_stale_backups(exe_dir, now_millis).await {
        Ok(0) => {}
        Ok(n) => log::info!("startup sweep removed {} stale backup(s)", n),
        Err(e) => log::warn!("backup sweep failed: {}", e),
    }

    match tokio::fs::remove_dir_all(update_temp_dir).await {
        Ok(()) => log::info!("removed update temp dir {}", update_temp_dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "could not remove update temp dir {}: {}",
            update_temp_dir.display(),
            e
        ),
    }

    match clear_dangling_pending(store).await {
        Ok(_) => {}
        Err(e) => log::warn!("pending-update check failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_timestamps_parse_and_reject() {
        assert_eq!(
            parse_backup_timestamp("adm-backup-1700000000000.exe"),
            Some(1_700_000_000_000)
        );
        assert_eq!(parse_backup_timestamp("adm-backup-.exe"), None);
        assert_eq!(parse_backup_timestamp("adm-backup-abc.exe"), None);
        assert_eq!(parse_backup_timestamp("other-backup-123.exe"), None);
        assert_eq!(parse_backup_timestamp("adm-backup-123.bak"), None);
    }
}
