use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};

use adm_core::catalog;
use adm_core::downloader::retry::RetryCoordinator;
use adm_core::downloader::stream_downloader::{
    StreamingFetcher, SELF_UPDATE_PROGRESS_INTERVAL,
};
use adm_core::hygiene;
use adm_core::installer::{InstallerPhase, UpdateInstaller, UpdateStore};
use adm_core::registrar::{
    find_main_executable, register_tolerantly, NullRegistrar, RegistrationInfo,
};
use adm_core::tasks::ActiveDownloads;

mod terminal_observer;
use terminal_observer::TerminalProgressObserver;

/// Fixed task identity for the self-update flow: at most one update
/// download can be in flight.
const SELF_UPDATE_TASK: &str = "self-update";

#[derive(Parser)]
#[command(name = "adm", about = "App installer & self-updater")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download, validate and register an app from the catalog
    Install {
        /// Catalog id of the app
        app_id: String,

        /// Path to the apps catalog JSON
        #[arg(long, default_value = "apps.json")]
        catalog: PathBuf,

        /// Base directory for installed apps
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Self-update operations
    Update {
        #[command(subcommand)]
        action: UpdateAction,
    },

    /// Clean stale backups, the update temp dir, and dangling records
    Sweep,
}

#[derive(Subcommand)]
enum UpdateAction {
    /// Download and stage a new version of this program
    Download {
        #[arg(long)]
        url: String,

        #[arg(long)]
        version: String,
    },

    /// Install the staged update and restart
    Apply,

    /// Show the staged update, if any
    Status,
}

fn update_temp_dir() -> PathBuf {
    std::env::temp_dir().join("adm-update")
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn startup_sweep(store: &UpdateStore) {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()));
    if let Some(dir) = exe_dir {
        hygiene::run_startup_sweep(&dir, &update_temp_dir(), store, now_millis()).await;
    }
}

async fn install_app(
    app_id: &str,
    catalog_path: &Path,
    dir: Option<PathBuf>,
) -> Result<(), String> {
    let apps = catalog::load_catalog(catalog_path).await;
    let app = apps
        .iter()
        .find(|a| a.id == app_id)
        .ok_or_else(|| format!("app '{}' not found in {}", app_id, catalog_path.display()))?;

    let base_dir = dir
        .or_else(|| dirs_next::download_dir().map(|d| d.join("adm")))
        .ok_or_else(|| "no download directory available; pass --dir".to_string())?;
    let folder_name = app
        .file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| app.file_name.clone());
    let app_dir = base_dir.join(&folder_name);
    tokio::fs::create_dir_all(&app_dir)
        .await
        .map_err(|e| format!("could not create {}: {}", app_dir.display(), e))?;

    let destination = app_dir.join(&app.file_name);
    println!("Installing {} -> {}", app.name, destination.display());

    let registry = Arc::new(ActiveDownloads::new());
    let fetcher = StreamingFetcher::new(&app.id, Arc::clone(&registry))
        .with_observer_factory(|| Box::new(TerminalProgressObserver::new()));

    let artifact = RetryCoordinator::for_app_download()
        .acquire_validated_artifact(&fetcher, &app.download_url, &destination)
        .await
        .map_err(|e| e.to_string())?;

    println!("Downloaded and validated: {}", artifact.display());

    // Registration is best-effort: a failure is reported, never fatal.
    if let Some(executable) = find_main_executable(&app_dir, &app.name, &folder_name) {
        let info = RegistrationInfo {
            app_id: app.id.clone(),
            display_name: app.name.clone(),
            version: app.version.clone(),
            publisher: None,
            install_location: app_dir.clone(),
            executable,
            uninstall_command: None,
        };
        register_tolerantly(&NullRegistrar, &info).await;
    } else {
        log::warn!("no executable found under {}", app_dir.display());
    }

    println!("{} installed at {}", app.name, app_dir.display());
    Ok(())
}

async fn download_update(url: &str, version: &str) -> Result<(), String> {
    let temp_dir = update_temp_dir();
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| format!("could not create {}: {}", temp_dir.display(), e))?;

    let destination = temp_dir.join(format!("adm-{}.exe", version));
    // A leftover partial download would confuse validation.
    let _ = tokio::fs::remove_file(&destination).await;

    println!("Downloading update {} ...", version);

    let registry = Arc::new(ActiveDownloads::new());
    let fetcher = StreamingFetcher::new(SELF_UPDATE_TASK, Arc::clone(&registry))
        .with_throttle(SELF_UPDATE_PROGRESS_INTERVAL)
        .with_observer_factory(|| Box::new(TerminalProgressObserver::new()));

    let artifact = RetryCoordinator::for_self_update()
        .acquire_validated_artifact(&fetcher, url, &destination)
        .await
        .map_err(|e| e.to_string())?;

    let store = UpdateStore::default_location().map_err(|e| e.to_string())?;
    let current_exe = std::env::current_exe().map_err(|e| e.to_string())?;
    let mut installer = UpdateInstaller::with_default_strategies(store, current_exe);
    let record = installer
        .stage(&artifact, version, url)
        .await
        .map_err(|e| e.to_string())?;

    println!(
        "Update {} staged ({} bytes). Run `adm update apply` to install.",
        record.target_version, record.file_size_bytes
    );
    Ok(())
}

async fn apply_update() -> Result<(), String> {
    let store = UpdateStore::default_location().map_err(|e| e.to_string())?;
    let current_exe = std::env::current_exe().map_err(|e| e.to_string())?;
    let mut installer = UpdateInstaller::with_default_strategies(store, current_exe);

    match installer.install_pending().await {
        Ok(method) => {
            println!("Update installation started via {}; restarting.", method);
            // Step 7 of the protocol: this process makes way for the new one.
            std::process::exit(0);
        }
        Err(e) => {
            if installer.phase() == InstallerPhase::RolledBack {
                eprintln!("Installation failed and was rolled back: {}", e);
                // The restored binary has been relaunched; this process ends.
                std::process::exit(1);
            }
            Err(e.to_string())
        }
    }
}

async fn update_status() -> Result<(), String> {
    let store = UpdateStore::default_location().map_err(|e| e.to_string())?;
    match store.load().await.map_err(|e| e.to_string())? {
        Some(record) => {
            println!("Staged update: {}", record.target_version);
            println!("  file:       {}", record.file_path.display());
            println!("  size:       {} bytes", record.file_size_bytes);
            println!("  source:     {}", record.source_url);
            println!("  staged at:  {} (unix)", record.downloaded_at);
        }
        None => println!("No update staged."),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Ok(store) = UpdateStore::default_location() {
        startup_sweep(&store).await;
    }

    let result = match args.command {
        Command::Install {
            app_id,
            catalog,
            dir,
        } => install_app(&app_id, &catalog, dir).await,
        Command::Update { action } => match action {
            UpdateAction::Download { url, version } => download_update(&url, &version).await,
            UpdateAction::Apply => apply_update().await,
            UpdateAction::Status => update_status().await,
        },
        Command::Sweep => {
            match UpdateStore::default_location() {
                Ok(store) => {
                    startup_sweep(&store).await;
                    println!("Sweep complete.");
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            }
        }
    };

    if let Err(message) = result {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}
