use std::path::PathBuf;

use async_trait::async_trait;

use crate::types::types::InstallError;

/// Everything a strategy needs to execute the swap protocol.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    /// Path of the running executable being replaced.
    pub current_exe: PathBuf,
    /// The validated staged artifact.
    pub artifact: PathBuf,
    /// Unique backup path next to the executable.
    pub backup: PathBuf,
}

impl InstallPlan {
    /// Image name used for process shutdown/termination.
    pub fn exe_name(&self) -> String {
        self.current_exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "adm.exe".to_string())
    }
}

#[derive(Debug)]
pub enum StrategyError {
    /// The execution mechanism itself could not be started (interpreter
    /// missing, script unwritable). The next strategy in the chain should
    /// be tried.
    CouldNotLaunch(String),
    /// The protocol ran and failed; rollback has already been resolved one
    /// way or the other. The chain must NOT continue.
    Protocol(InstallError),
}

/// One mechanism for executing the swap protocol. All strategies carry the
/// identical step semantics (shutdown wait, backup, copy, size verify,
/// relaunch, cleanup, rollback on failure); only the execution vehicle
/// differs. Strategies are ranked and the chain advances only on
/// `CouldNotLaunch`.
#[async_trait]
pub trait InstallStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap capability probe; a strategy that reports `false` is skipped
    /// without an attempt.
    fn available(&self) -> bool;

    async fn run(&self, plan: &InstallPlan) -> Result<(), StrategyError>;
}
