//! # Parafetch Library
//!
//! A parallel chunked HTTP(S) downloader. The remote size is probed with a
//! one-byte ranged request, the resource is split into contiguous byte
//! ranges, and every range is streamed concurrently straight to its offset
//! in a preallocated file.
//!
//! ## Features
//!
//! - **Range-based parallelism**: one connection per chunk, written in place
//! - **Graceful fallback**: unknown sizes are fetched whole, in one request
//! - **Fail-fast**: the first failing chunk fails the whole run
//! - **Lifecycle events**: subscribe to start, progress, chunk and failure events
//! - **Pluggable seams**: custom [`Transport`] and [`OutputTarget`] implementations
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Download to a file named after the last URL segment
//!     parafetch::download("https://example.com/files/disk.iso", None).await?;
//!
//!     // Download to a specific file
//!     parafetch::download("https://example.com/files/disk.iso", Some("./disk.iso")).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Events
//!
//! ```rust,no_run
//! use parafetch::{DownloadConfig, DownloadEvent, Downloader, EventKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = Downloader::new();
//!     downloader.on(EventKind::ChunkDownloaded, |event| {
//!         if let DownloadEvent::ChunkDownloaded { start, end } = event {
//!             println!("chunk {start}-{end:?} done");
//!         }
//!     });
//!
//!     let config = DownloadConfig::new("https://example.com/files/disk.iso", "disk.iso");
//!     let summary = downloader.download(&config).await?;
//!     println!("{} bytes in {} chunk(s)", summary.bytes_written, summary.chunk_count);
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Re-export core types that users might need
pub use crate::core::config::{
    ChunkPolicy, DownloadConfig, OverwriteBehavior, DEFAULT_BYTES_PER_CHUNK, DEFAULT_CHUNK_COUNT_HINT,
    DEFAULT_WRITE_BUFFER_SIZE,
};
pub use crate::core::discovery::{resolve_chunk_count, DiscoveredSize, SizeDiscoverer};
pub use crate::core::downloader::{DownloadPlan, DownloadSummary, Downloader, MAX_CHUNK_COUNT, MAX_RESOURCE_SIZE};
pub use crate::core::error::{Error, Result};
pub use crate::core::events::{DownloadEvent, EventBus, EventKind, Listener};
pub use crate::core::fetcher::ChunkFetcher;
pub use crate::core::output::{ChunkWriter, FileTarget, OutputTarget};
pub use crate::core::planner::{plan_ranges, ByteRange, FetchTarget};
pub use crate::core::transport::{BodyStream, HttpTransport, Transport, TransportRequest, TransportResponse};
pub use tokio_util::sync::CancellationToken;

// Internal modules
mod core;

// C-compatible FFI bindings (optional)
#[cfg(feature = "c-bindings")]
pub mod ffi;

/// Generates an output filename from a URL
///
/// Uses the last path segment, or `download` when the URL has none.
pub fn resolve_output_filename(url: &str) -> String {
    crate::core::resolve_output_filename(url)
}

/// Download a URL to a file
///
/// # Arguments
/// * `url` - http(s) URL of the resource
/// * `dest` - Optional destination file path. If None, derived from the URL
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// parafetch::download("https://example.com/data.bin", Some("./data.bin")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn download(url: &str, dest: Option<&str>) -> Result<DownloadSummary> {
    download_with_config(DownloadConfig::new(url, output_path(url, dest))).await
}

/// Download with progress tracking
///
/// The callback receives `(downloaded_bytes, total_bytes)` after every
/// buffer written by any chunk. `total_bytes` is 0 when the server did not
/// report a size.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// parafetch::download_with_progress(
///     "https://example.com/data.bin",
///     None,
///     |downloaded, total| {
///         println!("Progress: {}/{} bytes", downloaded, total);
///     }
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn download_with_progress<F>(url: &str, dest: Option<&str>, progress: F) -> Result<DownloadSummary>
where
    F: Fn(u64, u64) + Send + Sync + 'static,
{
    let downloader = Downloader::new();
    attach_progress(downloader.events(), progress);

    let config = DownloadConfig::new(url, output_path(url, dest));
    downloader.download(&config).await
}

/// Download with a full configuration
///
/// # Examples
/// ```rust,no_run
/// use parafetch::{ChunkPolicy, DownloadConfig, OverwriteBehavior};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DownloadConfig::new("https://example.com/data.bin", "data.bin")
///     .with_chunk_policy(ChunkPolicy::Fixed)
///     .with_chunk_count_hint(8)
///     .with_max_concurrency(4)
///     .with_write_buffer_size(128 * 1024)
///     .with_overwrite(OverwriteBehavior::NeverOverwrite);
///
/// parafetch::download_with_config(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn download_with_config(config: DownloadConfig) -> Result<DownloadSummary> {
    Downloader::new().download(&config).await
}

fn output_path(url: &str, dest: Option<&str>) -> String {
    match dest {
        Some(path) => path.to_string(),
        None => resolve_output_filename(url),
    }
}

/// Fold per-chunk progress events into a `(downloaded, total)` callback
pub(crate) fn attach_progress<F>(events: &EventBus, progress: F)
where
    F: Fn(u64, u64) + Send + Sync + 'static,
{
    let downloaded = Arc::new(AtomicU64::new(0));
    let total = Arc::new(AtomicU64::new(0));

    let (start_downloaded, start_total) = (Arc::clone(&downloaded), Arc::clone(&total));
    events.on(EventKind::DownloadStart, move |event| {
        if let DownloadEvent::DownloadStart { size, .. } = event {
            start_downloaded.store(0, Ordering::Relaxed);
            start_total.store(size.bytes().unwrap_or(0), Ordering::Relaxed);
        }
    });

    events.on(EventKind::ChunkDownloadProgress, move |event| {
        if let DownloadEvent::ChunkDownloadProgress { bytes, .. } = event {
            let so_far = downloaded.fetch_add(*bytes, Ordering::Relaxed) + bytes;
            progress(so_far, total.load(Ordering::Relaxed));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_resolve_output_filename() {
        assert_eq!(
            resolve_output_filename("https://example.com/files/disk.iso"),
            "disk.iso"
        );
        assert_eq!(resolve_output_filename("https://example.com/"), "download");
        assert_eq!(output_path("https://example.com/a.bin", Some("b.bin")), "b.bin");
        assert_eq!(output_path("https://example.com/a.bin", None), "a.bin");
    }

    #[test]
    fn test_progress_aggregates_across_chunks() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        attach_progress(&bus, move |downloaded, total| {
            sink.lock().unwrap().push((downloaded, total));
        });

        bus.emit(&DownloadEvent::DownloadStart {
            size: DiscoveredSize::Known(300),
            chunk_count: 3,
        });
        for start in [0, 100, 200] {
            bus.emit(&DownloadEvent::ChunkDownloadProgress {
                start,
                end: Some(start + 99),
                bytes: 100,
            });
        }

        assert_eq!(*seen.lock().unwrap(), vec![(100, 300), (200, 300), (300, 300)]);
    }

    #[test]
    fn test_progress_total_is_zero_when_unknown() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        attach_progress(&bus, move |downloaded, total| {
            sink.lock().unwrap().push((downloaded, total));
        });

        bus.emit(&DownloadEvent::DownloadStart {
            size: DiscoveredSize::Unknown,
            chunk_count: 1,
        });
        bus.emit(&DownloadEvent::ChunkDownloadProgress {
            start: 0,
            end: None,
            bytes: 42,
        });

        assert_eq!(*seen.lock().unwrap(), vec![(42, 0)]);
    }
}
