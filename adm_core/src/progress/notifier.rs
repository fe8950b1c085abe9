use tokio::sync::mpsc;

use super::observer::ProgressObserver;
use super::sample::ProgressSample;

/// Consumes `Result<ProgressSample, String>` from the transfer channel and
/// fans each message out to all registered observers.
///
/// | Channel message         | Observer method called         |
/// |-------------------------|--------------------------------|
/// | `Ok(ProgressSample)`    | `on_progress(&sample)`         |
/// | `Err(String)`           | `on_error(&msg)` then stops    |
/// | Channel closed (no err) | `on_complete(&last_sample)`    |
pub struct ProgressNotifier {
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Register an observer. Must be called before `run()`.
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    /// Consume samples until the channel closes or an error arrives.
    pub async fn run(self, mut progress_rx: mpsc::Receiver<Result<ProgressSample, String>>) {
        let mut last = ProgressSample::zero();

        while let Some(msg) = progress_rx.recv().await {
            match msg {
                Ok(sample) => {
                    for observer in &self.observers {
                        observer.on_progress(&sample).await;
                    }
                    last = sample;
                }
                Err(error) => {
                    for observer in &self.observers {
                        observer.on_error(&error).await;
                    }
                    return; // stop processing after error
                }
            }
        }

        // Channel closed cleanly — all senders dropped, no error received.
        // The sender emits a terminal percent-100 sample before dropping, so
        // `last` is the finished state.
        for observer in &self.observers {
            observer.on_complete(&last).await;
        }
    }
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}
