//! Chunk range planning

use serde::Serialize;

/// Inclusive byte span `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// What a single fetch retrieves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    /// A bounded span, requested with a `Range` header
    Range(ByteRange),
    /// The whole resource, requested without a `Range` header
    WholeFile,
}

impl FetchTarget {
    /// Offset of the first byte in the output
    pub fn start(&self) -> u64 {
        match self {
            FetchTarget::Range(range) => range.start,
            FetchTarget::WholeFile => 0,
        }
    }

    /// Last byte, when bounded
    pub fn end(&self) -> Option<u64> {
        match self {
            FetchTarget::Range(range) => Some(range.end),
            FetchTarget::WholeFile => None,
        }
    }
}

/// Split `[0, file_size)` into contiguous, gapless ranges
///
/// `chunk_size = ceil(file_size / chunk_count)`; the last range absorbs the
/// remainder, so fewer than `chunk_count` ranges may come back. A zero-length
/// file has no ranges.
pub fn plan_ranges(file_size: u64, chunk_count: usize) -> Vec<ByteRange> {
    if file_size == 0 {
        return Vec::new();
    }

    let chunk_count = (chunk_count.max(1) as u64).min(file_size);
    let chunk_size = file_size.div_ceil(chunk_count);

    (0..file_size)
        .step_by(usize::try_from(chunk_size).unwrap_or(usize::MAX))
        .map(|start| ByteRange {
            start,
            end: start.saturating_add(chunk_size - 1).min(file_size - 1),
        })
        .collect()
}
