//! Output file handling for parafetch
//!
//! The orchestrator prepares the destination once, then every chunk opens its
//! own writer positioned at its start offset. Chunks own disjoint byte ranges,
//! so their writers never overlap and need no locking.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWrite};

use crate::core::error::Result;

/// Writer positioned at a chunk's start offset
pub type ChunkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Capability to write chunk bytes at fixed offsets
pub trait OutputTarget: Send + Sync {
    /// Create or truncate the destination; extend it to `len` bytes when given
    fn prepare(&self, len: Option<u64>) -> BoxFuture<'_, Result<()>>;

    /// Open a writer whose first byte lands at `offset`
    fn open_at(&self, offset: u64) -> BoxFuture<'_, Result<ChunkWriter>>;
}

/// A file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputTarget for FileTarget {
    fn prepare(&self, len: Option<u64>) -> BoxFuture<'_, Result<()>> {
        async move {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)
                .await?;

            // Extending up front keeps concurrent chunk writers from racing on the file length
            if let Some(len) = len {
                file.set_len(len).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn open_at(&self, offset: u64) -> BoxFuture<'_, Result<ChunkWriter>> {
        async move {
            let mut file = OpenOptions::new().write(true).open(&self.path).await?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset)).await?;
            }
            Ok(Box::new(file) as ChunkWriter)
        }
        .boxed()
    }
}
