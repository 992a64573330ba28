// src/transport.rs

//! HTTP capability consumed by [`crate::remote_source::RemoteByteSource`].
//!
//! The byte source only ever needs two requests: a `HEAD` to learn the resource's length and
//! range support, and a ranged `GET`. Keeping those behind a small trait lets tests serve
//! resources from memory and count requests, while production uses [`ReqwestTransport`].

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use tracing::debug;

/// A failure below the HTTP layer (DNS, TLS, connection reset, truncated body).
pub type TransportFailure = Box<dyn StdError + Send + Sync>;

/// Inclusive byte range for a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// The parts of an HTTP response the byte source cares about.
///
/// Header values are kept raw; interpretation (e.g. what counts as range support) belongs
/// to the byte source.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub content_length: Option<u64>,
    pub accept_ranges: Option<String>,
    pub content_range: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// 2xx, including `206 Partial Content`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `"404 Not Found"`-style text for error messages.
    pub fn status_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {}", self.status, reason),
            None => self.status.to_string(),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a `HEAD` request. The body is always empty.
    async fn head(&self, url: &str) -> Result<HttpResponse, TransportFailure>;

    /// Issue a `GET` restricted to `range`.
    async fn get_range(&self, url: &str, range: RangeSpec)
    -> Result<HttpResponse, TransportFailure>;
}

/// [`HttpTransport`] on top of an async `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportFailure> {
        Self::with_options(None)
    }

    /// Build a client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportFailure> {
        Self::with_options(Some(timeout))
    }

    pub fn with_options(timeout: Option<Duration>) -> Result<Self, TransportFailure> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an already-configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn into_response(
        response: reqwest::Response,
        read_body: bool,
    ) -> Result<HttpResponse, TransportFailure> {
        let status = response.status();
        let headers = response.headers();

        let mut out = HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_owned),
            // Read the header itself: reqwest's `content_length()` reflects the body size
            // hint, which is zero for HEAD responses.
            content_length: header_str(headers, CONTENT_LENGTH.as_str())
                .and_then(|v| v.trim().parse().ok()),
            accept_ranges: header_str(headers, ACCEPT_RANGES.as_str()).map(str::to_owned),
            content_range: header_str(headers, CONTENT_RANGE.as_str()).map(str::to_owned),
            body: Bytes::new(),
        };

        if read_body && status.is_success() {
            out.body = response.bytes().await?;
        }

        Ok(out)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn head(&self, url: &str) -> Result<HttpResponse, TransportFailure> {
        debug!(url, "HEAD");
        let response = self.client.head(url).send().await?;
        Self::into_response(response, false).await
    }

    async fn get_range(
        &self,
        url: &str,
        range: RangeSpec,
    ) -> Result<HttpResponse, TransportFailure> {
        let header = range.to_header_value();
        debug!(url, range = %header, "GET");
        let response = self.client.get(url).header(RANGE, header).send().await?;
        Self::into_response(response, true).await
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
