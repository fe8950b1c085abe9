use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::types::{ArtifactKind, InstallError};
use crate::validator;

use super::process::{ProcessController, SystemProcessController};
use super::store::{PendingUpdate, UpdateStore};
use super::strategy::{
    BatchInstallStrategy, DirectCopyInstallStrategy, InstallPlan, InstallStrategy,
    PowershellInstallStrategy, StrategyError,
};

/// Backup files are `adm-backup-{unix_millis}.exe` next to the executable.
pub const BACKUP_PREFIX: &str = "adm-backup-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerPhase {
    Idle,
    Staged,
    Installing,
    Installed,
    RolledBack,
    Failed,
}

/// Drives the self-update lifecycle:
/// `Idle -> Staged -> Installing -> {Installed, RolledBack, Failed}`.
///
/// Staging persists a [`PendingUpdate`] record so a later restart can resume
/// installation. Installation is single-flight process-wide; the caller is
/// expected to exit the current process after `Installed` (and after
/// `RolledBack`, where a script strategy has relaunched the restored
/// binary). `Failed` before any destructive step returns control normally.
pub struct UpdateInstaller {
    store: UpdateStore,
    strategies: Vec<Box<dyn InstallStrategy>>,
    current_exe: PathBuf,
    phase: InstallerPhase,
}

impl UpdateInstaller {
    pub fn new(
        store: UpdateStore,
        strategies: Vec<Box<dyn InstallStrategy>>,
        current_exe: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            strategies,
            current_exe: current_exe.into(),
            phase: InstallerPhase::Idle,
        }
    }

    /// The ranked production chain: PowerShell script, batch script, then a
    /// direct in-process copy as last resort.
    pub fn with_default_strategies(store: UpdateStore, current_exe: impl Into<PathBuf>) -> Self {
        let process: Arc<dyn ProcessController> = Arc::new(SystemProcessController);
        Self::new(
            store,
            vec![
                Box::new(PowershellInstallStrategy),
                Box::new(BatchInstallStrategy),
                Box::new(DirectCopyInstallStrategy::new(process)),
            ],
            current_exe,
        )
    }

    pub fn phase(&self) -> InstallerPhase {
        self.phase
    }

    pub fn store(&self) -> &UpdateStore {
        &self.store
    }

    /// `Idle -> Staged`: persist the validated artifact as the pending
    /// update so an install can happen now or after a restart.
    pub async fn stage(
        &mut self,
        artifact: &Path,
        target_version: &str,
        source_url: &str,
    ) -> Result<PendingUpdate, InstallError> {
        let size = tokio::fs::metadata(artifact)
            .await
            .map_err(InstallError::Store)?
            .len();

        let record = PendingUpdate::new(artifact, target_version, source_url, size);
        self.store.save(&record).await.map_err(InstallError::Store)?;
        self.phase = InstallerPhase::Staged;
        Ok(record)
    }

    /// `Staged -> Installing -> {Installed, RolledBack, Failed}`.
    ///
    /// Returns the name of the strategy that took over on success. The
    /// staged artifact is re-validated first; a file that no longer passes
    /// is unusable, so the record is cleared and the artifact deleted
    /// (forcing a fresh download) before `Failed` is reported.
    pub async fn install_pending(&mut self) -> Result<&'static str, InstallError> {
        let record = match self.store.load().await.map_err(InstallError::Store)? {
            Some(record) => record,
            None => return Err(InstallError::NoPendingUpdate),
        };

        log::info!(
            "installing staged update {} from {}",
            record.target_version,
            record.file_path.display()
        );

        // Defense against tampering/corruption between staging and install.
        let revalidation = validator::validate(&record.file_path, ArtifactKind::SelfUpdate).await;
        let rejection = match revalidation {
            Ok(result) if result.valid => None,
            Ok(result) => Some(
                result
                    .reason
                    .unwrap_or_else(|| "artifact rejected".to_string()),
            ),
            Err(e) => Some(format!("staged artifact unreadable: {}", e)),
        };
        if let Some(reason) = rejection {
            log::warn!("staged update failed re-validation: {}", reason);
            self.store.clear().await.map_err(InstallError::Store)?;
            let _ = tokio::fs::remove_file(&record.file_path).await;
            self.phase = InstallerPhase::Failed;
            return Err(InstallError::StagedArtifactInvalid(reason));
        }

        self.phase = InstallerPhase::Installing;
        let plan = InstallPlan {
            current_exe: self.current_exe.clone(),
            artifact: record.file_path.clone(),
            backup: backup_path_for(&self.current_exe),
        };

        // The record is consumed by this attempt, whatever its outcome.
        self.store.clear().await.map_err(InstallError::Store)?;

        for strategy in &self.strategies {
            if !strategy.available() {
                log::debug!("install strategy {} unavailable, skipping", strategy.name());
                continue;
            }

            log::info!("attempting install via {}", strategy.name());
            match strategy.run(&plan).await {
                Ok(()) => {
                    self.phase = InstallerPhase::Installed;
                    return Ok(strategy.name());
                }
                Err(StrategyError::CouldNotLaunch(reason)) => {
                    log::warn!("install strategy {} could not launch: {}", strategy.name(), reason);
                    continue;
                }
                Err(StrategyError::Protocol(e)) => {
                    // The strategy already resolved rollback; the chain stops.
                    self.phase = InstallerPhase::RolledBack;
                    return Err(e);
                }
            }
        }

        // Nothing destructive happened; put the record back so a later
        // attempt can retry once an execution mechanism exists.
        self.store.save(&record).await.map_err(InstallError::Store)?;
        self.phase = InstallerPhase::Failed;
        Err(InstallError::NoStrategyAvailable)
    }
}

/// Unique backup path next to the executable being replaced.
pub fn backup_path_for(current_exe: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let dir = current_exe.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}{}.exe", BACKUP_PREFIX, millis))
}
