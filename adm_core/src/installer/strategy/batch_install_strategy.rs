use async_trait::async_trait;

use super::install_strategy::{InstallPlan, InstallStrategy, StrategyError};

/// Fallback mechanism: a self-deleting batch script run by cmd.exe.
const SCRIPT_TEMPLATE: &str = r#"@echo off
title Update Installation

echo Waiting for application to close...
timeout /t 5 /nobreak >nul

set "attempts=0"
:CHECK_PROCESS
set /a attempts+=1
tasklist /fi "imagename eq __EXE_NAME__" 2>nul | find /i "__EXE_NAME__" >nul
if not errorlevel 1 (
    if %attempts% lss 15 (
        timeout /t 2 /nobreak >nul
        goto CHECK_PROCESS
    ) else (
        taskkill /f /im "__EXE_NAME__" /t 2>nul
        timeout /t 3 /nobreak >nul
    )
)

echo Creating backup...
copy /Y "__CURRENT_EXE__" "__BACKUP_FILE__" >nul 2>&1

echo Installing update...
copy /Y "__UPDATE_FILE__" "__CURRENT_EXE__"
if errorlevel 1 goto RESTORE_BACKUP

for %%A in ("__CURRENT_EXE__") do set size=%%~zA
if %size% lss 1048576 goto RESTORE_BACKUP

echo Update installed, starting application...
start "" "__CURRENT_EXE__"
timeout /t 3 /nobreak >nul

del "__UPDATE_FILE__" 2>nul
del "__BACKUP_FILE__" 2>nul
goto END

:RESTORE_BACKUP
echo Restoring backup...
copy /Y "__BACKUP_FILE__" "__CURRENT_EXE__" >nul 2>&1
start "" "__CURRENT_EXE__"
del "__BACKUP_FILE__" 2>nul

:END
del "%~f0" 2>nul
"#;

pub struct BatchInstallStrategy;

impl BatchInstallStrategy {
    fn render_script(plan: &InstallPlan) -> String {
        SCRIPT_TEMPLATE
            .replace("__EXE_NAME__", &plan.exe_name())
            .replace("__CURRENT_EXE__", &plan.current_exe.display().to_string())
            .replace("__UPDATE_FILE__", &plan.artifact.display().to_string())
            .replace("__BACKUP_FILE__", &plan.backup.display().to_string())
    }
}

#[async_trait]
impl InstallStrategy for BatchInstallStrategy {
    fn name(&self) -> &'static str {
        "batch-script"
    }

    fn available(&self) -> bool {
        std::process::Command::new("cmd.exe")
            .args(["/c", "exit 0"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, plan: &InstallPlan) -> Result<(), StrategyError> {
        let script = Self::render_script(plan);
        let script_path = plan
            .current_exe
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("adm-update-install.bat");

        if let Err(e) = tokio::fs::write(&script_path, &script).await {
            return Err(StrategyError::CouldNotLaunch(format!(
                "could not write install script {}: {}",
                script_path.display(),
                e
            )));
        }

        let child = std::process::Command::new("cmd.exe")
            .arg("/c")
            .arg(&script_path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();

        match child {
            Ok(_) => {
                log::info!("update installation handed off to batch script");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&script_path).await;
                Err(StrategyError::CouldNotLaunch(format!(
                    "could not spawn cmd.exe: {}",
                    e
                )))
            }
        }
    }
}
