use std::sync::Mutex;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use adm_core::progress::{format_bytes, format_speed, ProgressObserver, ProgressSample};

/// Renders transfer progress as a single indicatif bar.
///
/// The bar is lazily initialised on the first sample, once the declared
/// total size is known.
pub struct TerminalProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgressObserver {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn ensure_bar(&self, sample: &ProgressSample) {
        let mut bar = self.bar.lock().unwrap();
        if bar.is_none() {
            let style = ProgressStyle::with_template(
                "[{bar:30.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}) ETA {eta} — {msg}",
            )
            .unwrap()
            .progress_chars("=>-");

            let pb = ProgressBar::new(sample.total_bytes.unwrap_or(0).max(1));
            pb.set_style(style);
            *bar = Some(pb);
        }
    }
}

impl Default for TerminalProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressObserver for TerminalProgressObserver {
    async fn on_progress(&self, sample: &ProgressSample) {
        self.ensure_bar(sample);
        let bar = self.bar.lock().unwrap();
        if let Some(pb) = bar.as_ref() {
            if let Some(total) = sample.total_bytes {
                pb.set_length(total.max(1));
            }
            pb.set_position(sample.bytes_downloaded);
            pb.set_message(format!("{}%", sample.percent));
        }
    }

    async fn on_complete(&self, sample: &ProgressSample) {
        self.ensure_bar(sample);
        let bar = self.bar.lock().unwrap();
        if let Some(pb) = bar.as_ref() {
            pb.set_position(sample.bytes_downloaded);
            pb.finish_with_message(format!(
                "Complete — {} at {}",
                format_bytes(sample.bytes_downloaded),
                format_speed(sample.speed_bps)
            ));
        }
    }

    async fn on_error(&self, error: &str) {
        let bar = self.bar.lock().unwrap();
        if let Some(pb) = bar.as_ref() {
            pb.abandon_with_message(format!("Failed: {}", error));
        } else {
            eprintln!("Download failed: {}", error);
        }
    }
}
