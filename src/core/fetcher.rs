//! Single chunk fetch: one request, streamed straight into the output
//!
//! Memory use per fetch is bounded by the write buffer regardless of chunk
//! size; body buffers are written as they arrive and never accumulated.

use std::time::Duration;

use futures::StreamExt;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::events::{DownloadEvent, EventBus};
use crate::core::output::OutputTarget;
use crate::core::planner::{ByteRange, FetchTarget};
use crate::core::transport::{Transport, TransportRequest};

/// Fetches one [`FetchTarget`] into its place in the output
pub struct ChunkFetcher<'a> {
    transport: &'a dyn Transport,
    output: &'a dyn OutputTarget,
    events: &'a EventBus,
    headers: &'a HeaderMap,
    write_buffer_size: usize,
    timeout: Option<Duration>,
}

impl<'a> ChunkFetcher<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        output: &'a dyn OutputTarget,
        events: &'a EventBus,
        headers: &'a HeaderMap,
        write_buffer_size: usize,
    ) -> Self {
        Self {
            transport,
            output,
            events,
            headers,
            write_buffer_size,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch `target` and write it at its offset, returning the bytes written
    ///
    /// Emits `CHUNK_DOWNLOADED` on success and `CHUNK_DOWNLOAD_FAILED` before
    /// returning any error other than cancellation.
    pub async fn fetch(&self, url: &str, target: FetchTarget, cancel: &CancellationToken) -> Result<u64> {
        let (start, end) = (target.start(), target.end());

        match self.stream_to_output(url, target, cancel).await {
            Ok(written) => {
                debug!("Chunk {} complete: {written} bytes", describe(target));
                self.events.emit(&DownloadEvent::ChunkDownloaded { start, end });
                Ok(written)
            }
            Err(Error::Cancelled) => {
                debug!("Chunk {} cancelled", describe(target));
                Err(Error::Cancelled)
            }
            Err(error) => {
                warn!("Chunk {} failed: {error}", describe(target));
                self.events.emit(&DownloadEvent::ChunkDownloadFailed {
                    start,
                    end,
                    error: &error,
                });
                Err(error)
            }
        }
    }

    async fn stream_to_output(&self, url: &str, target: FetchTarget, cancel: &CancellationToken) -> Result<u64> {
        let mut headers = self.headers.clone();
        match target {
            FetchTarget::Range(range) => {
                let value = HeaderValue::from_str(&range.header_value())
                    .map_err(|e| Error::InvalidInput(e.to_string()))?;
                headers.insert(RANGE, value);
            }
            // A whole-file fetch always starts at offset 0, so it must not be ranged
            FetchTarget::WholeFile => {
                headers.remove(RANGE);
            }
        }
        let request = TransportRequest::get(url, headers).with_timeout(self.timeout);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.transport.send(request) => response?,
        };
        check_response(target, response.status, &response.headers)?;

        let (start, end) = (target.start(), target.end());
        let writer = self.output.open_at(start).await?;
        let mut writer = BufWriter::with_capacity(self.write_buffer_size, writer);
        let mut body = response.body;
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = body.next() => next,
            };
            let Some(buffer) = next else {
                break;
            };
            let buffer = buffer?;
            if buffer.is_empty() {
                continue;
            }
            let received = buffer.len() as u64;

            // Never let an overlong body spill into the neighbouring chunk
            if let FetchTarget::Range(range) = target {
                if written + received > range.len() {
                    return Err(not_honored(range));
                }
            }

            writer.write_all(&buffer).await?;
            written += received;
            self.events.emit(&DownloadEvent::ChunkDownloadProgress {
                start,
                end,
                bytes: received,
            });
        }

        writer.flush().await?;
        Ok(written)
    }
}

/// Accept 206 always and 200 only where a full body cannot land at the wrong offset
fn check_response(target: FetchTarget, status: StatusCode, headers: &HeaderMap) -> Result<()> {
    match (status, target) {
        (StatusCode::PARTIAL_CONTENT, FetchTarget::Range(range)) => {
            match content_range_start(headers) {
                Some(start) if start != range.start => Err(not_honored(range)),
                _ => Ok(()),
            }
        }
        (StatusCode::PARTIAL_CONTENT, FetchTarget::WholeFile) => Ok(()),
        (StatusCode::OK, FetchTarget::WholeFile) => Ok(()),
        (StatusCode::OK, FetchTarget::Range(range)) => {
            let length = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            if range.start == 0 && length == Some(range.len()) {
                Ok(())
            } else {
                Err(not_honored(range))
            }
        }
        (other, _) => Err(Error::RemoteStatusError(other.as_u16())),
    }
}

fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (start, _) = value.trim().strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}

fn not_honored(range: ByteRange) -> Error {
    Error::RangeNotHonored {
        start: range.start,
        end: range.end,
    }
}

fn describe(target: FetchTarget) -> String {
    match target {
        FetchTarget::Range(range) => range.header_value(),
        FetchTarget::WholeFile => "whole-file".to_string(),
    }
}
