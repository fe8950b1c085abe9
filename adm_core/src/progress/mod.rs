pub mod notifier;
pub mod observer;
pub mod sample;

pub use notifier::ProgressNotifier;
pub use observer::ProgressObserver;
pub use sample::{format_bytes, format_speed, ProgressSample};
