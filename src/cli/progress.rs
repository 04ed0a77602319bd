//! CLI-specific progress handling for parafetch
//!
//! Drives an `indicatif` bar from download events.

use indicatif::{ProgressBar, ProgressStyle};
use parafetch::{DownloadEvent, EventBus, EventKind};

/// Creates a progress bar for CLI display with enhanced information
pub fn create_progress_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {bytes_per_sec} ETA: {eta}")
            .expect("Failed to create progress style")
            .progress_chars("#>-")
    );
    pb
}

/// Spinner for downloads whose size the server did not report
pub fn create_spinner() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {bytes} {bytes_per_sec}")
        .expect("Failed to create spinner style")
}

/// Progress bar fed by a downloader's event bus
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(message: &str) -> Self {
        let pb = create_progress_bar(0);

        // Print initial message to stderr
        eprintln!("{}", message);

        Self { pb }
    }

    /// Subscribe the bar to `events`
    ///
    /// The length is set from `DOWNLOAD_START`, every progress event advances
    /// the bar, and the bar is finished or abandoned at the end of the run.
    pub fn attach(&self, events: &EventBus) {
        let pb = self.pb.clone();
        events.on(EventKind::DownloadStart, move |event| {
            if let DownloadEvent::DownloadStart { size, .. } = event {
                pb.set_position(0);
                match size.bytes() {
                    Some(total) => pb.set_length(total),
                    None => pb.set_style(create_spinner()),
                }
            }
        });

        let pb = self.pb.clone();
        events.on(EventKind::ChunkDownloadProgress, move |event| {
            if let DownloadEvent::ChunkDownloadProgress { bytes, .. } = event {
                pb.inc(*bytes);
            }
        });

        let pb = self.pb.clone();
        events.on(EventKind::DownloadComplete, move |_| {
            pb.finish_with_message("✅ Download completed!");
        });

        let pb = self.pb.clone();
        events.on(EventKind::DownloadFailed, move |_| {
            pb.abandon();
        });
    }
}
