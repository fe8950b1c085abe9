pub mod batch_install_strategy;
pub mod direct_copy_install_strategy;
pub mod install_strategy;
pub mod powershell_install_strategy;

pub use batch_install_strategy::BatchInstallStrategy;
pub use direct_copy_install_strategy::DirectCopyInstallStrategy;
pub use install_strategy::{InstallPlan, InstallStrategy, StrategyError};
pub use powershell_install_strategy::PowershellInstallStrategy;
