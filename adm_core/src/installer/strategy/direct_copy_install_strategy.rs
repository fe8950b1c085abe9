use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::installer::process::{wait_for_shutdown, ProcessController, SHUTDOWN_TIMEOUT};
use crate::types::types::InstallError;

use super::install_strategy::{InstallPlan, InstallStrategy, StrategyError};

/// The replaced executable must be at least this big to be believable.
pub const MIN_INSTALLED_BYTES: u64 = 1024 * 1024;

/// Delay confirming the relaunched process came up before cleanup.
const RELAUNCH_GRACE: Duration = Duration::from_secs(3);

/// Last-resort mechanism: the swap protocol executed in this process with
/// plain file copies. Used when neither script interpreter can be launched.
pub struct DirectCopyInstallStrategy {
    process: Arc<dyn ProcessController>,
}

impl DirectCopyInstallStrategy {
    pub fn new(process: Arc<dyn ProcessController>) -> Self {
        Self { process }
    }

    /// Steps 3–5: the destructive portion whose failure demands rollback.
    async fn destructive_steps(&self, plan: &InstallPlan) -> Result<(), InstallError> {
        tokio::fs::copy(&plan.artifact, &plan.current_exe)
            .await
            .map_err(InstallError::Replace)?;

        let installed = tokio::fs::metadata(&plan.current_exe)
            .await
            .map_err(InstallError::Replace)?;
        if installed.len() < MIN_INSTALLED_BYTES {
            return Err(InstallError::VerifySize {
                got: installed.len(),
                floor: MIN_INSTALLED_BYTES,
            });
        }

        self.process
            .spawn_detached(&plan.current_exe)
            .map_err(InstallError::Relaunch)?;

        Ok(())
    }

    /// Restore the backup over the executable path, relaunch the restored
    /// binary, delete the backup.
    async fn rollback(&self, plan: &InstallPlan) -> Result<(), String> {
        tokio::fs::copy(&plan.backup, &plan.current_exe)
            .await
            .map_err(|e| format!("restoring backup failed: {}", e))?;

        self.process
            .spawn_detached(&plan.current_exe)
            .map_err(|e| format!("relaunching restored executable failed: {}", e))?;

        if let Err(e) = tokio::fs::remove_file(&plan.backup).await {
            log::warn!("could not remove backup {}: {}", plan.backup.display(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl InstallStrategy for DirectCopyInstallStrategy {
    fn name(&self) -> &'static str {
        "direct-copy"
    }

    fn available(&self) -> bool {
        true
    }

    async fn run(&self, plan: &InstallPlan) -> Result<(), StrategyError> {
        // Step 1: other instances must let go of the executable first.
        wait_for_shutdown(self.process.as_ref(), &plan.exe_name(), SHUTDOWN_TIMEOUT)
            .await
            .map_err(StrategyError::Protocol)?;

        // Step 2: backup before anything destructive happens.
        if let Err(e) = tokio::fs::copy(&plan.current_exe, &plan.backup).await {
            let _ = tokio::fs::remove_file(&plan.backup).await;
            return Err(StrategyError::Protocol(InstallError::Backup(e)));
        }

        match self.destructive_steps(plan).await {
            Ok(()) => {
                // Step 6: cleanup after the relaunch grace window.
                tokio::time::sleep(RELAUNCH_GRACE).await;
                if let Err(e) = tokio::fs::remove_file(&plan.backup).await {
                    log::warn!("could not remove backup {}: {}", plan.backup.display(), e);
                }
                if let Err(e) = tokio::fs::remove_file(&plan.artifact).await {
                    log::warn!(
                        "could not remove staged artifact {}: {}",
                        plan.artifact.display(),
                        e
                    );
                }
                log::info!("update installed via direct copy");
                Ok(())
            }
            Err(original) => {
                log::error!("install step failed ({}), rolling back", original);
                match self.rollback(plan).await {
                    Ok(()) => {
                        log::info!("rollback complete, original executable restored");
                        Err(StrategyError::Protocol(original))
                    }
                    Err(rollback) => {
                        // The one case needing user intervention: log everything.
                        let current_size = std::fs::metadata(&plan.current_exe)
                            .map(|m| m.len().to_string())
                            .unwrap_or_else(|_| "unknown".into());
                        log::error!(
                            "ROLLBACK FAILED: executable may be inconsistent. \
                             current={} ({} bytes) backup={} artifact={} cause={}",
                            plan.current_exe.display(),
                            current_size,
                            plan.backup.display(),
                            plan.artifact.display(),
                            rollback
                        );
                        Err(StrategyError::Protocol(InstallError::RollbackFailed {
                            original: Box::new(original),
                            rollback,
                        }))
                    }
                }
            }
        }
    }
}
