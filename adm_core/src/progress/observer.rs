use async_trait::async_trait;

use super::sample::ProgressSample;

/// Trait for anything that wants to observe transfer progress.
///
/// The `ProgressNotifier` calls these methods on all registered observers as
/// samples arrive on the progress channel.
///
/// Lifecycle:
/// - `on_progress` is called for every throttled sample.
/// - `on_complete` is called once when the transfer finishes successfully
///   (the progress channel closed without an error message). The sample it
///   carries reports `percent == 100`.
/// - `on_error` is called once when the transfer fails (an `Err(String)`
///   was received on the progress channel).
#[async_trait]
pub trait ProgressObserver: Send + Sync + 'static {
    async fn on_progress(&self, sample: &ProgressSample);

    async fn on_complete(&self, sample: &ProgressSample);

    async fn on_error(&self, error: &str);
}
