// src/remote_source.rs

//! A seekable, readable "file" backed by HTTP range requests.
//!
//! Responsibilities:
//! - Resolve the resource length once (`HEAD`, falling back to a one-byte ranged `GET`) and memoize it
//! - Refuse servers that do not advertise byte-range support
//! - Serve `read`/`seek` with file semantics against a logical cursor
//!
//! There is no cache: every `read` is a fresh ranged `GET`.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::transport::{HttpResponse, HttpTransport, RangeSpec, TransportFailure};

/// Total length of a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceSize {
    Bounded(u64),
    /// Neither `Content-Length` nor a `Content-Range` total was available.
    Unbounded,
}

/// Reference point for [`ByteSource::seek`], as in `SEEK_SET`/`SEEK_CUR`/`SEEK_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// Split a `std::io::SeekFrom` into an offset and a reference point.
    pub fn from_seek_from(pos: SeekFrom) -> (i64, Whence) {
        match pos {
            SeekFrom::Start(n) => (i64::try_from(n).unwrap_or(i64::MAX), Whence::Start),
            SeekFrom::Current(n) => (n, Whence::Current),
            SeekFrom::End(n) => (n, Whence::End),
        }
    }
}

/// The I/O capability a demux engine reads through.
///
/// Methods take `&mut self`: one source has exactly one logical reader, and operations are
/// defined only in issuance order.
#[async_trait]
pub trait ByteSource: Send {
    /// Total length, resolved once and then served from memory.
    async fn size(&mut self) -> Result<SourceSize>;

    /// Read up to `max_bytes` from the cursor. An empty result means end of file.
    async fn read(&mut self, max_bytes: usize) -> Result<Bytes>;

    /// Move the cursor and return its new absolute position.
    async fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    /// Current cursor position.
    fn position(&self) -> u64;
}

/// [`ByteSource`] over plain HTTP `Range` requests.
pub struct RemoteByteSource {
    url: String,
    transport: Arc<dyn HttpTransport>,
    size: Option<SourceSize>,
    position: u64,
}

impl RemoteByteSource {
    pub fn new(url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
            size: None,
            position: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn resolve_size(&self) -> Result<SourceSize> {
        let head = self
            .transport
            .head(&self.url)
            .await
            .map_err(|e| self.network_failure("file size determination", e))?;
        self.check_status(&head, "")?;

        if !advertises_byte_ranges(head.accept_ranges.as_deref()) {
            return Err(self.error(
                ErrorKind::RangeUnsupported,
                "Server does not support byte-range requests. Seeking is not possible.",
            ));
        }

        if let Some(len) = head.content_length {
            return Ok(SourceSize::Bounded(len));
        }

        debug!(url = %self.url, "no content-length; asking for a one-byte range");
        let first_byte = self
            .transport
            .get_range(&self.url, RangeSpec::new(0, Some(0)))
            .await
            .map_err(|e| self.network_failure("file size determination", e))?;
        self.check_status(&first_byte, "")?;

        Ok(first_byte
            .content_range
            .as_deref()
            .and_then(content_range_total)
            .map_or(SourceSize::Unbounded, SourceSize::Bounded))
    }

    fn check_status(&self, response: &HttpResponse, during: &str) -> Result<()> {
        if response.status == 404 {
            return Err(self.error(
                ErrorKind::NotFound,
                format!("File not found on remote server{during}."),
            ));
        }
        if !response.is_success() {
            return Err(self.error(
                ErrorKind::TransportError,
                format!("Network error{during}: {}", response.status_line()),
            ));
        }
        Ok(())
    }

    fn network_failure(&self, during: &str, source: TransportFailure) -> Error {
        self.error(
            ErrorKind::TransportError,
            format!("Network error during {during}: {source}"),
        )
        .with_source(source)
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> Error {
        Error::new(kind, message).with_url(self.url.clone())
    }
}

#[async_trait]
impl ByteSource for RemoteByteSource {
    async fn size(&mut self) -> Result<SourceSize> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self.resolve_size().await?;
        debug!(url = %self.url, ?size, "resolved remote size");
        self.size = Some(size);
        Ok(size)
    }

    async fn read(&mut self, max_bytes: usize) -> Result<Bytes> {
        let size = self.size().await?;

        let want = match size {
            SourceSize::Bounded(total) => (max_bytes as u64).min(total.saturating_sub(self.position)),
            // Never past the last addressable byte.
            SourceSize::Unbounded => (max_bytes as u64).min(u64::MAX - self.position),
        };
        if want == 0 {
            return Ok(Bytes::new());
        }

        let range = RangeSpec::new(self.position, Some(self.position + want - 1));
        let response = self
            .transport
            .get_range(&self.url, range)
            .await
            .map_err(|e| {
                self.error(
                    ErrorKind::ReadError,
                    format!("Error reading file chunk from remote server: {e}"),
                )
                .with_source(e)
            })?;
        self.check_status(&response, " during read")?;

        // A server that ignores `Range` may send more than asked for.
        let mut body = response.body;
        if body.len() as u64 > want {
            body.truncate(want as usize);
        }

        self.position += body.len() as u64;
        Ok(body)
    }

    async fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let size = self.size().await?;

        let base = match (whence, size) {
            (Whence::Start, _) => Some(0),
            (Whence::Current, _) => Some(i128::from(self.position)),
            (Whence::End, SourceSize::Bounded(total)) => Some(i128::from(total)),
            (Whence::End, SourceSize::Unbounded) => None,
        };
        let target = base.map(|b| b + i128::from(offset));

        let in_bounds = match (target, size) {
            (Some(t), _) if t < 0 => None,
            (Some(t), SourceSize::Bounded(total)) if t > i128::from(total) => None,
            (Some(t), _) => u64::try_from(t).ok(),
            (None, _) => None,
        };

        let Some(position) = in_bounds else {
            return Err(self.error(ErrorKind::SeekOutOfBounds, "Seek position out of bounds."));
        };
        self.position = position;
        Ok(position)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Range support must be advertised explicitly; there is no full-download fallback.
fn advertises_byte_ranges(accept_ranges: Option<&str>) -> bool {
    accept_ranges.is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"))
}

/// Total length from a `Content-Range` value such as `bytes 0-0/1234`.
///
/// `None` when the total is `*` or otherwise not a number.
fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    if total.is_empty() || !total.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    total.parse().ok()
}
