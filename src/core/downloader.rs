//! Download orchestration for parafetch
//!
//! One run moves through size discovery, then either a single whole-file
//! fetch or preallocation followed by concurrent ranged fetches. Any error
//! fails the whole run: `DOWNLOAD_FAILED` is emitted and the error returned.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::config::{DownloadConfig, OverwriteBehavior};
use crate::core::discovery::{resolve_chunk_count, DiscoveredSize, SizeDiscoverer};
use crate::core::error::{Error, Result};
use crate::core::events::{DownloadEvent, EventBus, EventKind};
use crate::core::fetcher::ChunkFetcher;
use crate::core::output::{FileTarget, OutputTarget};
use crate::core::planner::{plan_ranges, ByteRange, FetchTarget};
use crate::core::transport::{HttpTransport, Transport};

/// What a run will fetch, derived from the discovered size
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadPlan {
    pub size: DiscoveredSize,
    /// Number of fetches the run issues
    pub chunk_count: usize,
    /// Planned ranges; empty when the resource is fetched whole
    pub ranges: Vec<ByteRange>,
}

/// Largest size a local file can be extended to
pub const MAX_RESOURCE_SIZE: u64 = i64::MAX as u64;

/// Upper bound on planned chunks per run
pub const MAX_CHUNK_COUNT: usize = 65_536;

impl DownloadPlan {
    /// Plan a run, refusing sizes and chunk counts no file or connection pool can hold
    pub fn from_discovery(size: DiscoveredSize, config: &DownloadConfig) -> Result<Self> {
        if let DiscoveredSize::Known(total) = size {
            if total > MAX_RESOURCE_SIZE {
                return Err(Error::InvalidInput(format!(
                    "Server reported an implausible size of {total} bytes"
                )));
            }
        }

        let resolved = resolve_chunk_count(size, config.chunk_count_hint, config.chunk_policy);
        if resolved > MAX_CHUNK_COUNT {
            return Err(Error::InvalidInput(format!(
                "{resolved} chunks exceed the limit of {MAX_CHUNK_COUNT}; use a larger chunk size"
            )));
        }

        Ok(match size {
            DiscoveredSize::Known(0) => Self {
                size,
                chunk_count: 0,
                ranges: Vec::new(),
            },
            DiscoveredSize::Known(total) if resolved > 1 => {
                let ranges = plan_ranges(total, resolved);
                Self {
                    size,
                    chunk_count: ranges.len(),
                    ranges,
                }
            }
            _ => Self {
                size,
                chunk_count: 1,
                ranges: Vec::new(),
            },
        })
    }

    /// Whether the run preallocates and fetches ranges concurrently
    pub fn is_parallel(&self) -> bool {
        !self.ranges.is_empty()
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub size: DiscoveredSize,
    pub chunk_count: usize,
    pub bytes_written: u64,
}

/// Check if destination file exists and handle overwrite behavior
fn check_overwrite_permission(file_path: &Path, behavior: &OverwriteBehavior) -> Result<()> {
    if !file_path.exists() {
        return Ok(());
    }

    let display = file_path.display();
    match behavior {
        OverwriteBehavior::Force => {
            info!("Overwriting existing file: {display}");
            Ok(())
        }
        OverwriteBehavior::NeverOverwrite => Err(Error::IoError(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("File already exists: {display} (use --force to overwrite)"),
        ))),
        OverwriteBehavior::Prompt => {
            eprintln!("⚠️  File already exists: {display}");
            eprint!("Overwrite? [y/N]: ");

            use std::io::Write;
            std::io::stderr().flush()?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            match input.trim().to_lowercase().as_str() {
                "y" | "yes" => Ok(()),
                _ => Err(Error::IoError(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "Download cancelled by user",
                ))),
            }
        }
    }
}

/// Run the overwrite check on the blocking pool, since `Prompt` waits on stdin
async fn confirm_overwrite(config: &DownloadConfig) -> Result<()> {
    let path = config.output_path.clone();
    let behavior = config.overwrite.clone();
    tokio::task::spawn_blocking(move || check_overwrite_permission(&path, &behavior))
        .await
        .map_err(|e| Error::IoError(std::io::Error::other(e)))?
}

/// Parallel chunked downloader
///
/// Listeners registered on [`Downloader::events`] persist across runs; no
/// other state does.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    events: EventBus,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    /// Create a downloader over the shared HTTP client
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HttpTransport::new()))
    }

    /// Create a downloader over a custom transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            events: EventBus::new(),
        }
    }

    /// Event bus for lifecycle notifications
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a listener for one kind of event
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&DownloadEvent<'_>) + Send + Sync + 'static,
    {
        self.events.on(kind, listener);
    }

    /// Discover the size and plan the run without downloading anything
    pub async fn plan(&self, config: &DownloadConfig) -> Result<DownloadPlan> {
        config.validate()?;
        let size = self.discover(config).await?;
        DownloadPlan::from_discovery(size, config)
    }

    /// Download `config.url` to `config.output_path`
    pub async fn download(&self, config: &DownloadConfig) -> Result<DownloadSummary> {
        self.download_with_cancel(config, CancellationToken::new()).await
    }

    /// Download, aborting when `cancel` fires
    pub async fn download_with_cancel(
        &self,
        config: &DownloadConfig,
        cancel: CancellationToken,
    ) -> Result<DownloadSummary> {
        let output = FileTarget::new(&config.output_path);
        let result: Result<DownloadSummary> = async {
            config.validate()?;
            confirm_overwrite(config).await?;
            self.run(config, &output, &cancel).await
        }
        .await;
        self.finish(config, result)
    }

    /// Download into a caller-supplied output target
    pub async fn download_into(
        &self,
        config: &DownloadConfig,
        output: &dyn OutputTarget,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary> {
        let result = match config.validate() {
            Ok(()) => self.run(config, output, cancel).await,
            Err(error) => Err(error),
        };
        self.finish(config, result)
    }

    fn finish(&self, config: &DownloadConfig, result: Result<DownloadSummary>) -> Result<DownloadSummary> {
        match &result {
            Ok(summary) => info!(
                "Downloaded {} ({} bytes in {} chunk(s))",
                config.url, summary.bytes_written, summary.chunk_count
            ),
            Err(error) => {
                warn!("Download of {} failed: {error}", config.url);
                self.events.emit(&DownloadEvent::DownloadFailed { error });
            }
        }
        result
    }

    async fn discover(&self, config: &DownloadConfig) -> Result<DiscoveredSize> {
        SizeDiscoverer::new(self.transport.as_ref(), &config.headers)
            .with_timeout(config.request_timeout)
            .discover(&config.url)
            .await
    }

    async fn run(
        &self,
        config: &DownloadConfig,
        output: &dyn OutputTarget,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary> {
        // Failing this run must not cancel the caller's token
        let cancel = cancel.child_token();

        debug!("Discovering size of {}", config.url);
        let size = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            size = self.discover(config) => size?,
        };
        let plan = DownloadPlan::from_discovery(size, config)?;
        debug!("Plan for {}: {size:?}, {} fetch(es)", config.url, plan.chunk_count);

        let fetcher = ChunkFetcher::new(
            self.transport.as_ref(),
            output,
            &self.events,
            &config.headers,
            config.write_buffer_size,
        )
        .with_timeout(config.request_timeout);

        let start = DownloadEvent::DownloadStart {
            size,
            chunk_count: plan.chunk_count,
        };

        let bytes_written = match (size, plan.is_parallel()) {
            (DiscoveredSize::Known(0), _) => {
                output.prepare(Some(0)).await?;
                self.events.emit(&start);
                0
            }
            (DiscoveredSize::Known(total), true) => {
                debug!("Preallocating {total} bytes");
                output.prepare(Some(total)).await?;
                self.events.emit(&start);
                self.fetch_all(&fetcher, &config.url, &plan.ranges, config.max_concurrency, &cancel)
                    .await?
            }
            _ => {
                output.prepare(None).await?;
                self.events.emit(&start);
                fetcher.fetch(&config.url, FetchTarget::WholeFile, &cancel).await?
            }
        };

        self.events.emit(&DownloadEvent::DownloadComplete);
        Ok(DownloadSummary {
            size,
            chunk_count: plan.chunk_count,
            bytes_written,
        })
    }

    /// Fetch all ranges concurrently; the first failure fails the join
    async fn fetch_all(
        &self,
        fetcher: &ChunkFetcher<'_>,
        url: &str,
        ranges: &[ByteRange],
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let concurrency = limit.unwrap_or(ranges.len()).clamp(1, ranges.len().max(1));
        debug!("Fetching {} chunks, up to {concurrency} at a time", ranges.len());

        let mut in_flight = futures::stream::iter(ranges.iter().copied())
            .map(move |range| fetcher.fetch(url, FetchTarget::Range(range), cancel))
            .buffer_unordered(concurrency);

        let mut written = 0u64;
        while let Some(result) = in_flight.next().await {
            match result {
                Ok(bytes) => written += bytes,
                Err(error) => {
                    // Remaining chunks stop at their next suspension point
                    cancel.cancel();
                    return Err(error);
                }
            }
        }
        Ok(written)
    }
}
