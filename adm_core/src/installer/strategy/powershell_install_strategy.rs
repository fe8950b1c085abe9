use async_trait::async_trait;

use super::install_strategy::{InstallPlan, InstallStrategy, StrategyError};

/// The preferred mechanism: a detached PowerShell script that waits for this
/// process to exit, then performs the swap with its own rollback.
const SCRIPT_TEMPLATE: &str = r#"
$ErrorActionPreference = 'Stop'
$ProgressPreference = 'SilentlyContinue'

$currentExe = "__CURRENT_EXE__"
$updateFile = "__UPDATE_FILE__"
$backupFile = "__BACKUP_FILE__"

# Wait for the running instance to release the executable
$timeout = 30
$count = 0
do {
    $processes = Get-Process | Where-Object { $_.Path -eq $currentExe } 2>$null
    if ($processes) {
        Start-Sleep -Seconds 1
        $count++
        if ($count -gt $timeout) {
            $processes | Stop-Process -Force
            Start-Sleep -Seconds 2
            break
        }
    }
} while ($processes)

Copy-Item -Path $currentExe -Destination $backupFile -Force

try {
    Copy-Item -Path $updateFile -Destination $currentExe -Force

    if ((Get-Item $currentExe).Length -lt 1MB) {
        throw "updated executable is too small, possibly corrupted"
    }

    Remove-Item -Path $updateFile -Force -ErrorAction SilentlyContinue
    Start-Process -FilePath $currentExe -WindowStyle Normal

    Start-Sleep -Seconds 3
    Remove-Item -Path $backupFile -Force -ErrorAction SilentlyContinue
} catch {
    if (Test-Path $backupFile) {
        Copy-Item -Path $backupFile -Destination $currentExe -Force
        Start-Process -FilePath $currentExe -WindowStyle Normal
        Remove-Item -Path $backupFile -Force -ErrorAction SilentlyContinue
    }
    throw $_
}
"#;

pub struct PowershellInstallStrategy;

impl PowershellInstallStrategy {
    fn render_script(plan: &InstallPlan) -> String {
        SCRIPT_TEMPLATE
            .replace("__CURRENT_EXE__", &plan.current_exe.display().to_string())
            .replace("__UPDATE_FILE__", &plan.artifact.display().to_string())
            .replace("__BACKUP_FILE__", &plan.backup.display().to_string())
    }
}

#[async_trait]
impl InstallStrategy for PowershellInstallStrategy {
    fn name(&self) -> &'static str {
        "powershell"
    }

    fn available(&self) -> bool {
        std::process::Command::new("powershell.exe")
            .args(["-NoProfile", "-Command", "exit 0"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, plan: &InstallPlan) -> Result<(), StrategyError> {
        let script = Self::render_script(plan);

        let child = std::process::Command::new("powershell.exe")
            .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(format!("& {{ {} }}", script))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();

        match child {
            Ok(_) => {
                log::info!("update installation handed off to PowerShell");
                Ok(())
            }
            Err(e) => Err(StrategyError::CouldNotLaunch(format!(
                "could not spawn powershell: {}",
                e
            ))),
        }
    }
}
