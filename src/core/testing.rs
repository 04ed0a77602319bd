//! In-process transport and output fakes shared by unit tests

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tokio::io::AsyncWrite;

use crate::core::discovery::DiscoveredSize;
use crate::core::error::{Error, Result};
use crate::core::events::{DownloadEvent, EventBus, EventKind};
use crate::core::output::{ChunkWriter, OutputTarget};
use crate::core::transport::{BodyStream, Transport, TransportRequest, TransportResponse};

type Handler = dyn Fn(&TransportRequest) -> Result<TransportResponse> + Send + Sync;

/// Transport answering every request through a closure
pub struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `Range` header values of all requests, `None` for unranged ones
    pub fn range_headers(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|r| {
                r.headers
                    .get("range")
                    .map(|v| v.to_str().unwrap().to_string())
            })
            .collect()
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<TransportResponse>> {
        self.requests.lock().unwrap().push(request.clone());
        let result = (self.handler)(&request);
        futures::future::ready(result).boxed()
    }
}

/// Build a response with a finite body
pub fn response(status: u16, headers: &[(&str, String)], chunks: Vec<Result<Bytes>>) -> TransportResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    TransportResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: map,
        body: futures::stream::iter(chunks).boxed(),
    }
}

/// A body that never yields
pub fn stalled_body() -> BodyStream {
    futures::stream::pending().boxed()
}

/// Requested range of a fake request, parsed from its `Range` header
pub fn requested_range(request: &TransportRequest) -> Option<(u64, u64)> {
    let value = request.headers.get("range")?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Serve `body` with proper range semantics
pub fn serve_ranges(
    body: Arc<Vec<u8>>,
) -> impl Fn(&TransportRequest) -> Result<TransportResponse> + Send + Sync + 'static {
    move |request: &TransportRequest| {
        let total = body.len() as u64;
        match requested_range(request) {
            Some((start, end)) => {
                let end = end.min(total - 1);
                let slice = body[start as usize..=end as usize].to_vec();
                Ok(response(
                    206,
                    &[("content-range", format!("bytes {start}-{end}/{total}"))],
                    vec![Ok(Bytes::from(slice))],
                ))
            }
            None => Ok(response(
                200,
                &[("content-length", total.to_string())],
                vec![Ok(Bytes::from(body.as_ref().clone()))],
            )),
        }
    }
}

/// Output target backed by memory; records every call
#[derive(Default)]
pub struct MemoryTarget {
    pub data: Arc<Mutex<Vec<u8>>>,
    pub prepared: Mutex<Vec<Option<u64>>>,
    pub opened: Mutex<Vec<u64>>,
}

impl MemoryTarget {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl OutputTarget for MemoryTarget {
    fn prepare(&self, len: Option<u64>) -> BoxFuture<'_, Result<()>> {
        // Length is recorded, not allocated, so huge simulated files stay cheap
        self.data.lock().unwrap().clear();
        self.prepared.lock().unwrap().push(len);
        futures::future::ready(Ok(())).boxed()
    }

    fn open_at(&self, offset: u64) -> BoxFuture<'_, Result<ChunkWriter>> {
        self.opened.lock().unwrap().push(offset);
        let writer = MemoryWriter {
            data: Arc::clone(&self.data),
            pos: offset as usize,
        };
        futures::future::ready(Ok(Box::new(writer) as ChunkWriter)).boxed()
    }
}

struct MemoryWriter {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let end = this.pos + buf.len();
        let mut data = this.data.lock().unwrap();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[this.pos..end].copy_from_slice(buf);
        this.pos = end;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Owned copy of an event, for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Start(DiscoveredSize, usize),
    Complete,
    Progress(u64, Option<u64>, u64),
    Chunked(u64, Option<u64>),
    ChunkFailed(u64, Option<u64>, String),
    Failed(String),
}

impl Recorded {
    pub fn kind(&self) -> EventKind {
        match self {
            Recorded::Start(..) => EventKind::DownloadStart,
            Recorded::Complete => EventKind::DownloadComplete,
            Recorded::Progress(..) => EventKind::ChunkDownloadProgress,
            Recorded::Chunked(..) => EventKind::ChunkDownloaded,
            Recorded::ChunkFailed(..) => EventKind::ChunkDownloadFailed,
            Recorded::Failed(..) => EventKind::DownloadFailed,
        }
    }
}

/// Subscribe to every event on `bus` and keep owned copies
pub fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<Recorded>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    bus.on_any(move |event| {
        let recorded = match event {
            DownloadEvent::DownloadStart { size, chunk_count } => Recorded::Start(*size, *chunk_count),
            DownloadEvent::DownloadComplete => Recorded::Complete,
            DownloadEvent::ChunkDownloadProgress { start, end, bytes } => {
                Recorded::Progress(*start, *end, *bytes)
            }
            DownloadEvent::ChunkDownloaded { start, end } => Recorded::Chunked(*start, *end),
            DownloadEvent::ChunkDownloadFailed { start, end, error } => {
                Recorded::ChunkFailed(*start, *end, error.to_string())
            }
            DownloadEvent::DownloadFailed { error } => Recorded::Failed(error.to_string()),
        };
        sink.lock().unwrap().push(recorded);
    });
    log
}

/// Kinds of recorded events, progress excluded
pub fn lifecycle(log: &Arc<Mutex<Vec<Recorded>>>) -> Vec<EventKind> {
    log.lock()
        .unwrap()
        .iter()
        .map(Recorded::kind)
        .filter(|kind| *kind != EventKind::ChunkDownloadProgress)
        .collect()
}

pub fn transport_error(message: &str) -> Error {
    Error::TransportError(message.to_string())
}
