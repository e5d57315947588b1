//! Download progress events and sinks.
//!
//! Progress is passed explicitly into the fetch engine as an
//! `Arc<dyn ProgressSink>`. Leaving it out (`None`) disables reporting.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Phase of a single asset transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Downloading, // Receiving bytes
    Extracting,  // Unpacking the fetched archive
    Complete,    // Asset on disk
}

/// One progress update for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Source URL of the transfer.
    pub url: String,
    pub phase: DownloadPhase,
    /// Bytes received so far.
    pub bytes_downloaded: u64,
    /// Content length, when the server announced one.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    pub fn downloading(url: &str, bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            url: url.to_owned(),
            phase: DownloadPhase::Downloading,
            bytes_downloaded,
            total_bytes,
        }
    }

    pub fn extracting(url: &str, bytes_downloaded: u64) -> Self {
        Self {
            url: url.to_owned(),
            phase: DownloadPhase::Extracting,
            bytes_downloaded,
            total_bytes: Some(bytes_downloaded),
        }
    }

    pub fn complete(url: &str, bytes_downloaded: u64) -> Self {
        Self {
            url: url.to_owned(),
            phase: DownloadPhase::Complete,
            bytes_downloaded,
            total_bytes: Some(bytes_downloaded),
        }
    }

    /// Fraction complete in `0.0..=1.0`, if the total size is known.
    pub fn fraction(&self) -> Option<f32> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some((self.bytes_downloaded as f64 / total as f64).clamp(0.0, 1.0) as f32),
        }
    }

    /// Human-readable one-line description.
    pub fn message(&self) -> String {
        let name = self.url.rsplit('/').next().unwrap_or(&self.url);
        match self.phase {
            DownloadPhase::Downloading => {
                let mb_downloaded = self.bytes_downloaded as f64 / 1_048_576.0;
                match self.total_bytes {
                    Some(total) if total > 0 => format!(
                        "downloading {} ({:.1} MB / {:.1} MB)",
                        name,
                        mb_downloaded,
                        total as f64 / 1_048_576.0
                    ),
                    _ => format!("downloading {} ({:.1} MB)", name, mb_downloaded),
                }
            }
            DownloadPhase::Extracting => format!("extracting {}", name),
            DownloadPhase::Complete => format!("{} complete", name),
        }
    }
}

/// Receiver of progress updates.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &DownloadProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    fn report(&self, progress: &DownloadProgress) {
        self(progress)
    }
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: &DownloadProgress) {}
}

/// Built-in terminal tracker backed by an `indicatif` bar.
///
/// One bar is created per transfer and finished on [`DownloadPhase::Complete`].
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_bar(total: Option<u64>) -> ProgressBar {
        let bar = ProgressBar::new(total.unwrap_or(0));
        let style = ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {bytes}/{total_bytes} ({bytes_per_sec})  {msg}")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, progress: &DownloadProgress) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };

        match progress.phase {
            DownloadPhase::Downloading => {
                let bar = slot.get_or_insert_with(|| Self::new_bar(progress.total_bytes));
                if let Some(total) = progress.total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(progress.bytes_downloaded);
                bar.set_message(progress.message());
            }
            DownloadPhase::Extracting => {
                let bar = slot.get_or_insert_with(|| Self::new_bar(progress.total_bytes));
                bar.set_message(progress.message());
            }
            DownloadPhase::Complete => {
                if let Some(bar) = slot.take() {
                    bar.set_position(progress.bytes_downloaded);
                    bar.finish_with_message(progress.message());
                }
            }
        }
    }
}
