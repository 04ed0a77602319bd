//! HTTP transport seam for parafetch
//!
//! The engine only needs "send a request, get status + headers + a byte
//! stream". [`HttpTransport`] provides that over reqwest; tests substitute
//! in-process implementations.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use once_cell::sync::Lazy;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method, StatusCode};

use crate::core::error::{Error, Result};

/// Global HTTP client with connection pooling
static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(20)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("parafetch/{}", env!("PARAFETCH_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
});

/// Response body as a stream of buffers
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// An outgoing request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn get(url: &str, headers: HeaderMap) -> Self {
        Self {
            method: Method::GET,
            url: url.to_string(),
            headers,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A response whose body has not been read yet
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Capability to issue HTTP requests
///
/// Implementations fail with [`Error::TransportError`] when the request
/// cannot be issued; HTTP error statuses are returned as normal responses.
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<TransportResponse>>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Transport sharing the global connection pool
    pub fn new() -> Self {
        Self {
            client: GLOBAL_CLIENT.clone(),
        }
    }

    /// Transport over a caller-built client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<TransportResponse>> {
        async move {
            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes_stream()
                .map(|item| item.map_err(Error::from))
                .boxed();

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        }
        .boxed()
    }
}
