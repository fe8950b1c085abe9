use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::types::types::RegistrarError;

/// Display metadata handed to the OS integration layer after an install.
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    pub app_id: String,
    pub display_name: String,
    pub version: String,
    pub publisher: Option<String>,
    pub install_location: PathBuf,
    pub executable: PathBuf,
    pub uninstall_command: Option<String>,
}

/// Opaque OS registration capability (Add/Remove Programs, shortcuts, ...).
/// The core decides *when* registration happens; how is not its business.
#[async_trait]
pub trait SystemRegistrar: Send + Sync {
    async fn register(&self, info: &RegistrationInfo) -> Result<(), RegistrarError>;

    async fn unregister(&self, app_id: &str) -> Result<(), RegistrarError>;
}

/// Registrar that only logs. Used headless and in tests.
pub struct NullRegistrar;

#[async_trait]
impl SystemRegistrar for NullRegistrar {
    async fn register(&self, info: &RegistrationInfo) -> Result<(), RegistrarError> {
        log::info!(
            "registration skipped (no registrar): {} {} at {}",
            info.display_name,
            info.version,
            info.install_location.display()
        );
        Ok(())
    }

    async fn unregister(&self, app_id: &str) -> Result<(), RegistrarError> {
        log::info!("unregistration skipped (no registrar): {}", app_id);
        Ok(())
    }
}

/// Invoke the registrar and tolerate its failure: a broken registration
/// must never abort an otherwise successful installation.
pub async fn register_tolerantly(registrar: &dyn SystemRegistrar, info: &RegistrationInfo) {
    if let Err(e) = registrar.register(info).await {
        log::warn!(
            "could not register {} with the system: {}",
            info.display_name,
            e
        );
    }
}

/// File-name patterns that mark an executable as an installer/codec rather
/// than the app itself.
const EXCLUDED_NAME_PATTERNS: &[&str] = &[
    "install", "setup", "codec", "k-lite", "vcredist", "redist", "uninstall",
];

/// Recursively collect every `.exe` under `dir`. Unreadable directories are
/// skipped. Files in a directory are collected before descending, so
/// shallower candidates rank earlier.
pub fn collect_executables(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut subdirs = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("could not read directory {}: {}", dir.display(), e);
            return found;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("exe"))
            .unwrap_or(false)
        {
            found.push(path);
        }
    }

    for sub in subdirs {
        found.extend(collect_executables(&sub));
    }

    found
}

/// Rank executable candidates: exact priority-name matches first (in
/// priority order), then anything that does not look like an installer or
/// codec, then the rest as fallback. Pure over the candidate list so it is
/// testable without a filesystem.
pub fn rank_executables(candidates: &[PathBuf], priority_names: &[String]) -> Vec<PathBuf> {
    let lowered_name = |p: &PathBuf| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    };

    let mut ranked: Vec<PathBuf> = Vec::with_capacity(candidates.len());

    for priority in priority_names {
        let wanted = priority.to_lowercase();
        for candidate in candidates {
            if lowered_name(candidate) == wanted && !ranked.contains(candidate) {
                ranked.push(candidate.clone());
            }
        }
    }

    for candidate in candidates {
        let name = lowered_name(candidate);
        let excluded = EXCLUDED_NAME_PATTERNS.iter().any(|p| name.contains(p));
        if !excluded && !ranked.contains(candidate) {
            ranked.push(candidate.clone());
        }
    }

    for candidate in candidates {
        if !ranked.contains(candidate) {
            ranked.push(candidate.clone());
        }
    }

    ranked
}

/// Priority names derived from the app: `{app name sans punctuation}.exe`
/// and `{folder name}.exe`.
pub fn priority_names_for(app_name: &str, folder_name: &str) -> Vec<String> {
    let compact: String = app_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    let mut names = Vec::new();
    if !compact.is_empty() {
        names.push(format!("{}.exe", compact));
    }
    names.push(format!("{}.exe", folder_name.to_lowercase()));
    names
}

/// The single best executable guess for an installed app directory.
pub fn find_main_executable(dir: &Path, app_name: &str, folder_name: &str) -> Option<PathBuf> {
    let candidates = collect_executables(dir);
    let priorities = priority_names_for(app_name, folder_name);
    rank_executables(&candidates, &priorities).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn priority_names_win_over_everything() {
        let candidates = paths(&["app/Setup.exe", "app/SimTrainer.exe", "app/helper.exe"]);
        let priorities = vec!["simtrainer.exe".to_string()];

        let ranked = rank_executables(&candidates, &priorities);
        assert_eq!(ranked[0], PathBuf::from("app/SimTrainer.exe"));
    }

    #[test]
    fn installers_and_codecs_rank_last() {
        let candidates = paths(&[
            "app/K-Lite_Codec_Pack.exe",
            "app/vcredist_x64.exe",
            "app/viewer.exe",
        ]);

        let ranked = rank_executables(&candidates, &[]);
        assert_eq!(ranked[0], PathBuf::from("app/viewer.exe"));
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn all_excluded_still_yields_a_fallback() {
        let candidates = paths(&["app/setup.exe", "app/uninstall.exe"]);

        let ranked = rank_executables(&candidates, &[]);
        assert_eq!(ranked[0], PathBuf::from("app/setup.exe"));
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn priority_name_derivation_strips_punctuation() {
        let names = priority_names_for("Sim Trainer 3.0!", "sim-trainer");
        assert_eq!(names[0], "simtrainer30.exe");
        assert_eq!(names[1], "sim-trainer.exe");
    }
}
