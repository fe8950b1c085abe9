pub mod process;
pub mod store;
pub mod strategy;
pub mod update_installer;

pub use store::{PendingUpdate, UpdateStore};
pub use update_installer::{backup_path_for, InstallerPhase, UpdateInstaller, BACKUP_PREFIX};
