use std::path::Path;

use serde::{Deserialize, Serialize};

/// Per-app descriptor from the static catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub download_url: String,
    pub file_name: String,
    #[serde(default)]
    pub requires_setup: bool,
    #[serde(default)]
    pub setup_steps: Vec<String>,
}

/// Descriptor for a self-update offered by the release channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescriptor {
    pub download_url: String,
    pub latest_version: String,
}

/// Load the app catalog. A missing or unparseable file yields an empty
/// catalog with a logged warning — the catalog is configuration, not a hard
/// dependency.
pub async fn load_catalog(path: &Path) -> Vec<AppDescriptor> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("catalog not readable at {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Vec<AppDescriptor>>(&raw) {
        Ok(apps) => {
            log::info!("loaded {} apps from {}", apps.len(), path.display());
            apps
        }
        Err(e) => {
            log::warn!("catalog at {} is not valid JSON: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_camel_case() {
        let json = r#"{
            "id": "sim-trainer",
            "name": "Sim Trainer",
            "version": "2.1.0",
            "downloadUrl": "https://example.com/sim-trainer.zip",
            "fileName": "sim-trainer.zip",
            "requiresSetup": true,
            "setupSteps": ["run-codec-installer"]
        }"#;

        let app: AppDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(app.id, "sim-trainer");
        assert_eq!(app.download_url, "https://example.com/sim-trainer.zip");
        assert!(app.requires_setup);
        assert_eq!(app.setup_steps, vec!["run-codec-installer"]);
    }

    #[test]
    fn setup_fields_default_when_absent() {
        let json = r#"{
            "id": "viewer",
            "name": "Viewer",
            "version": "1.0.0",
            "downloadUrl": "https://example.com/viewer.zip",
            "fileName": "viewer.zip"
        }"#;

        let app: AppDescriptor = serde_json::from_str(json).unwrap();
        assert!(!app.requires_setup);
        assert!(app.setup_steps.is_empty());
    }
}
