use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::types::types::InstallError;

/// How long to wait for sibling instances to exit before force-terminating.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay after a forced kill so file handles get released.
const FORCE_KILL_SETTLE: Duration = Duration::from_secs(2);

/// Process operations the install protocol needs, behind a seam so the
/// protocol is testable without touching real processes.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Whether any *other* process with this image name is still running.
    async fn others_running(&self, exe_name: &str) -> bool;

    /// Force-terminate every other process with this image name.
    async fn terminate_others(&self, exe_name: &str) -> io::Result<()>;

    /// Launch an executable detached from the current process, so it
    /// survives this process exiting.
    fn spawn_detached(&self, exe: &Path) -> io::Result<()>;
}

/// Bounded shutdown wait: poll until no sibling instance remains, then
/// force-terminate whatever is left once the timeout passes.
///
/// Blocking here is fine — this only runs inside the explicit, user-visible
/// restart action, never on the steady-state path.
pub async fn wait_for_shutdown(
    ctrl: &dyn ProcessController,
    exe_name: &str,
    timeout: Duration,
) -> Result<(), InstallError> {
    let deadline = tokio::time::Instant::now() + timeout;

    while ctrl.others_running(exe_name).await {
        if tokio::time::Instant::now() >= deadline {
            log::warn!(
                "instances of {} still running after {:?}, force-terminating",
                exe_name,
                timeout
            );
            ctrl.terminate_others(exe_name)
                .await
                .map_err(|e| InstallError::ProcessShutdown(e.to_string()))?;
            tokio::time::sleep(FORCE_KILL_SETTLE).await;
            return Ok(());
        }
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }

    Ok(())
}

/// `ProcessController` over the system task tools (`tasklist`/`taskkill`).
pub struct SystemProcessController;

#[async_trait]
impl ProcessController for SystemProcessController {
    async fn others_running(&self, exe_name: &str) -> bool {
        let output = Command::new("tasklist")
            .arg("/FI")
            .arg(format!("IMAGENAME eq {}", exe_name))
            .arg("/NH")
            .output()
            .await;

        match output {
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                // tasklist prints an INFO line when the filter matches nothing
                let mut matches = stdout
                    .lines()
                    .filter(|l| l.to_ascii_lowercase().contains(&exe_name.to_ascii_lowercase()));
                // one match is the caller itself
                matches.next().is_some() && matches.next().is_some()
            }
            Err(e) => {
                log::debug!("tasklist unavailable ({}), assuming no other instances", e);
                false
            }
        }
    }

    async fn terminate_others(&self, exe_name: &str) -> io::Result<()> {
        let status = Command::new("taskkill")
            .arg("/F")
            .arg("/IM")
            .arg(exe_name)
            .arg("/T")
            .status()
            .await?;
        if !status.success() {
            log::warn!("taskkill for {} exited with {}", exe_name, status);
        }
        Ok(())
    }

    fn spawn_detached(&self, exe: &Path) -> io::Result<()> {
        std::process::Command::new(exe)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(|_| ())
    }
}
