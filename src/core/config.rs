//! Download configuration for parafetch
//!
//! Holds everything one download run needs. A configuration is never mutated
//! by the engine; values discovered at run time (such as the chunk count) are
//! computed separately and threaded through explicitly.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, RANGE};

use crate::core::error::{Error, Result};

/// Default number of chunks before the remote size is known
pub const DEFAULT_CHUNK_COUNT_HINT: usize = 3;

/// Default size of each chunk's write buffer
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024; // 64KB

/// Default number of bytes covered by one chunk
pub const DEFAULT_BYTES_PER_CHUNK: u64 = 100 * 1024 * 1024; // 100MiB

/// Reject headers the engine sets itself; caller values would shift byte offsets
fn check_reserved(name: &HeaderName) -> Result<()> {
    if *name == RANGE || *name == ACCEPT_ENCODING {
        return Err(Error::InvalidInput(format!(
            "Header '{name}' is managed by the downloader and cannot be overridden"
        )));
    }
    Ok(())
}

/// How the number of chunks is derived once the remote size is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// One chunk per this many bytes; resources smaller than that use a
    /// single unranged request
    PerChunkBytes(u64),
    /// Use `chunk_count_hint` as-is
    Fixed,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self::PerChunkBytes(DEFAULT_BYTES_PER_CHUNK)
    }
}

/// Overwrite behavior for existing files
#[derive(Debug, Clone, PartialEq)]
pub enum OverwriteBehavior {
    /// Prompt user for confirmation
    Prompt,
    /// Truncate existing files without asking (library default)
    Force,
    /// Never overwrite, fail if file exists
    NeverOverwrite,
}

impl Default for OverwriteBehavior {
    fn default() -> Self {
        Self::Force
    }
}

/// Configuration for a single download run
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Remote resource to fetch
    pub url: String,

    /// Destination file; its parent directory must already exist
    pub output_path: PathBuf,

    /// Chunk count used before the size is known, or always with
    /// [`ChunkPolicy::Fixed`]
    pub chunk_count_hint: usize,

    /// Bytes buffered per chunk before hitting the file
    pub write_buffer_size: usize,

    /// Chunk count policy applied to the discovered size
    pub chunk_policy: ChunkPolicy,

    /// Optional cap on concurrently in-flight chunk fetches
    pub max_concurrency: Option<usize>,

    /// Extra headers sent with every request
    pub headers: HeaderMap,

    /// Optional deadline for each HTTP request
    pub request_timeout: Option<Duration>,

    /// Behavior when the output file already exists
    pub overwrite: OverwriteBehavior,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            output_path: PathBuf::new(),
            chunk_count_hint: DEFAULT_CHUNK_COUNT_HINT,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            chunk_policy: ChunkPolicy::default(),
            max_concurrency: None,
            headers: HeaderMap::new(),
            request_timeout: None,
            overwrite: OverwriteBehavior::default(),
        }
    }
}

impl DownloadConfig {
    /// Create a configuration with default tuning for `url` → `output_path`
    pub fn new(url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    pub fn with_chunk_count_hint(mut self, hint: usize) -> Self {
        self.chunk_count_hint = hint;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_chunk_policy(mut self, policy: ChunkPolicy) -> Self {
        self.chunk_policy = policy;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_overwrite(mut self, overwrite: OverwriteBehavior) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("Invalid header name '{name}': {e}")))?;
        check_reserved(&name)?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| Error::InvalidInput(format!("Invalid value for header '{name}': {e}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Check the configuration before any request is issued
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported URL scheme '{}' (expected http or https)",
                url.scheme()
            )));
        }

        if self.chunk_count_hint == 0 {
            return Err(Error::InvalidInput("Chunk count must be at least 1".to_string()));
        }
        if self.write_buffer_size == 0 {
            return Err(Error::InvalidInput("Write buffer size must be at least 1 byte".to_string()));
        }
        if self.max_concurrency == Some(0) {
            return Err(Error::InvalidInput("Concurrency limit must be at least 1".to_string()));
        }
        if self.chunk_policy == ChunkPolicy::PerChunkBytes(0) {
            return Err(Error::InvalidInput("Chunk size must be at least 1 byte".to_string()));
        }

        for name in self.headers.keys() {
            check_reserved(name)?;
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(Error::InvalidInput("Output path is empty".to_string()));
        }
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(Error::InvalidInput(format!(
                    "Output directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }
}

/// Generates an output filename from the last segment of a URL path
pub fn resolve_output_filename(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}
