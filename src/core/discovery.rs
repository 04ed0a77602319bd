//! Remote size discovery
//!
//! Probes with `GET` + `Range: bytes=0-0` rather than `HEAD`, since some
//! range-capable endpoints refuse `HEAD`. The size comes from the
//! `Content-Range` total first, then `Content-Length`, else it is unknown.

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use serde::Serialize;

use crate::core::config::ChunkPolicy;
use crate::core::error::Result;
use crate::core::transport::{Transport, TransportRequest};

/// Outcome of size discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "bytes", rename_all = "snake_case")]
pub enum DiscoveredSize {
    Known(u64),
    /// The server gave no usable size; not an error
    Unknown,
}

impl DiscoveredSize {
    pub fn bytes(self) -> Option<u64> {
        match self {
            DiscoveredSize::Known(size) => Some(size),
            DiscoveredSize::Unknown => None,
        }
    }
}

/// Determines the total size of a remote resource
pub struct SizeDiscoverer<'a> {
    transport: &'a dyn Transport,
    headers: &'a HeaderMap,
    timeout: Option<std::time::Duration>,
}

impl<'a> SizeDiscoverer<'a> {
    pub fn new(transport: &'a dyn Transport, headers: &'a HeaderMap) -> Self {
        Self {
            transport,
            headers,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `url` for its size
    ///
    /// Fails only when the probe itself cannot be issued.
    pub async fn discover(&self, url: &str) -> Result<DiscoveredSize> {
        let mut headers = self.headers.clone();
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-0"));

        let request = TransportRequest::get(url, headers).with_timeout(self.timeout);
        let response = self.transport.send(request).await?;
        // The probe body is at most one byte of payload; dropping it closes the stream
        drop(response.body);

        let size = size_from_headers(response.status, &response.headers);
        debug!("Size probe for {url}: status {}, size {size:?}", response.status);
        Ok(size)
    }
}

/// Apply the size precedence rules to a probe response
pub fn size_from_headers(status: StatusCode, headers: &HeaderMap) -> DiscoveredSize {
    if let Some(total) = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
    {
        return DiscoveredSize::Known(total);
    }

    // A 206 length is the probe's length, and error bodies say nothing about the resource
    if status == StatusCode::OK {
        if let Some(length) = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            return DiscoveredSize::Known(length);
        }
    }

    DiscoveredSize::Unknown
}

/// Extract `<total>` from `bytes <start>-<end>/<total>` or `bytes */<total>`
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (range, total) = rest.trim_start().split_once('/')?;

    let range_ok = range == "*"
        || range.split_once('-').is_some_and(|(start, end)| {
            matches!((start.parse::<u64>(), end.parse::<u64>()), (Ok(s), Ok(e)) if s <= e)
        });
    if !range_ok {
        return None;
    }

    total.trim().parse::<u64>().ok()
}

/// Resolve how many chunks a resource of `size` is split into
///
/// Unknown sizes are always fetched whole. With the default policy anything
/// under 100 MiB is a single chunk, larger resources get `ceil(size / 100 MiB)`.
pub fn resolve_chunk_count(size: DiscoveredSize, hint: usize, policy: ChunkPolicy) -> usize {
    let Some(size) = size.bytes() else {
        return 1;
    };

    match policy {
        ChunkPolicy::PerChunkBytes(bytes_per_chunk) => {
            let bytes_per_chunk = bytes_per_chunk.max(1);
            if size < bytes_per_chunk {
                1
            } else {
                usize::try_from(size.div_ceil(bytes_per_chunk)).unwrap_or(usize::MAX)
            }
        }
        // Never plan more chunks than there are bytes
        ChunkPolicy::Fixed => {
            let cap = usize::try_from(size).unwrap_or(usize::MAX).max(1);
            hint.clamp(1, cap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_BYTES_PER_CHUNK;
    use crate::core::error::Error;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/123456"), Some(123456));
        assert_eq!(parse_content_range_total("bytes 100-199/1000"), Some(1000));
        assert_eq!(parse_content_range_total("bytes */0"), Some(0));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("bytes 5-1/10"), None);
        assert_eq!(parse_content_range_total("items 0-0/10"), None);
        assert_eq!(parse_content_range_total("bytes0-0/10"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_content_range_wins_over_content_length() {
        let map = headers(&[("content-range", "bytes 0-0/123456"), ("content-length", "1")]);
        let size = size_from_headers(StatusCode::PARTIAL_CONTENT, &map);
        assert_eq!(size, DiscoveredSize::Known(123456));
        assert_eq!(resolve_chunk_count(size, 3, ChunkPolicy::default()), 1);
    }

    #[test]
    fn test_content_length_fallback() {
        let map = headers(&[("content-length", "987654321")]);
        let size = size_from_headers(StatusCode::OK, &map);
        assert_eq!(size, DiscoveredSize::Known(987654321));
        assert_eq!(resolve_chunk_count(size, 3, ChunkPolicy::default()), 10);
    }

    #[test]
    fn test_no_size_headers_is_unknown() {
        let size = size_from_headers(StatusCode::OK, &HeaderMap::new());
        assert_eq!(size, DiscoveredSize::Unknown);
        assert_eq!(resolve_chunk_count(size, 3, ChunkPolicy::default()), 1);
    }

    #[test]
    fn test_content_length_ignored_on_partial_and_error_statuses() {
        let map = headers(&[("content-length", "1")]);
        assert_eq!(
            size_from_headers(StatusCode::PARTIAL_CONTENT, &map),
            DiscoveredSize::Unknown
        );
        let map = headers(&[("content-length", "512")]);
        assert_eq!(size_from_headers(StatusCode::NOT_FOUND, &map), DiscoveredSize::Unknown);
    }

    #[test]
    fn test_unsatisfiable_range_reports_empty_resource() {
        let map = headers(&[("content-range", "bytes */0")]);
        assert_eq!(
            size_from_headers(StatusCode::RANGE_NOT_SATISFIABLE, &map),
            DiscoveredSize::Known(0)
        );
    }

    #[test]
    fn test_resolve_chunk_count_boundaries() {
        let policy = ChunkPolicy::default();
        let mib100 = DEFAULT_BYTES_PER_CHUNK;
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(0), 3, policy), 1);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(mib100 - 1), 3, policy), 1);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(mib100), 3, policy), 1);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(mib100 + 1), 3, policy), 2);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(3 * mib100), 3, policy), 3);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Unknown, 3, policy), 1);
    }

    #[test]
    fn test_resolve_chunk_count_fixed_policy() {
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(1000), 4, ChunkPolicy::Fixed), 4);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(2), 4, ChunkPolicy::Fixed), 2);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(0), 4, ChunkPolicy::Fixed), 1);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Unknown, 4, ChunkPolicy::Fixed), 1);
    }

    #[test]
    fn test_resolution_is_pure() {
        // A large resource must not influence a later, unrelated small one
        let policy = ChunkPolicy::default();
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(987654321), 3, policy), 10);
        assert_eq!(resolve_chunk_count(DiscoveredSize::Known(123456), 3, policy), 1);
    }

    #[tokio::test]
    async fn test_discover_sends_single_byte_probe() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.iso"))
            .and(header("range", "bytes=0-0"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 0-0/123456")
                    .set_body_bytes(vec![0u8]),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = crate::core::transport::HttpTransport::new();
        let extra = HeaderMap::new();
        let discoverer = SizeDiscoverer::new(&transport, &extra);
        let size = discoverer
            .discover(&format!("{}/big.iso", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(size, DiscoveredSize::Known(123456));
    }

    #[tokio::test]
    async fn test_discover_transport_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = crate::core::transport::HttpTransport::new();
        let extra = HeaderMap::new();
        let result = SizeDiscoverer::new(&transport, &extra)
            .discover(&format!("http://127.0.0.1:{port}/file"))
            .await;
        assert!(matches!(result, Err(Error::TransportError(_))));
    }
}
