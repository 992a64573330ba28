//! Blocking `Read + Seek` view of an async [`ByteSource`].
//!
//! Symphonia pulls bytes synchronously. The demux work therefore runs on tokio's blocking pool
//! and each read or seek re-enters the runtime with `Handle::block_on`. The source is only ever
//! touched by the one demux thread; the mutex exists to satisfy `MediaSource: Sync`.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Mutex;

use ::symphonia::core::io::MediaSource;
use tokio::runtime::Handle;

use crate::error::{Error, ErrorKind, Result};
use crate::remote_source::{ByteSource, SourceSize, Whence};

pub(crate) struct BlockingSource {
    inner: Mutex<Box<dyn ByteSource>>,
    runtime: Handle,
    byte_len: Option<u64>,
}

impl BlockingSource {
    /// Resolve the source's size up front so `byte_len` is cheap.
    ///
    /// Must be called off the async worker threads (e.g. inside `spawn_blocking`).
    pub(crate) fn new(mut source: Box<dyn ByteSource>, runtime: Handle) -> Result<Self> {
        let byte_len = match runtime.block_on(source.size())? {
            SourceSize::Bounded(len) => Some(len),
            SourceSize::Unbounded => None,
        };

        Ok(Self {
            inner: Mutex::new(source),
            runtime,
            byte_len,
        })
    }
}

impl Read for BlockingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let source = self
            .inner
            .get_mut()
            .map_err(|_| io::Error::other("byte source mutex poisoned"))?;
        let bytes = self
            .runtime
            .block_on(source.read(buf.len()))
            .map_err(into_io_error)?;

        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}

impl Seek for BlockingSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = Whence::from_seek_from(pos);

        let source = self
            .inner
            .get_mut()
            .map_err(|_| io::Error::other("byte source mutex poisoned"))?;
        self.runtime
            .block_on(source.seek(offset, whence))
            .map_err(into_io_error)
    }
}

impl MediaSource for BlockingSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

fn into_io_error(err: Error) -> io::Error {
    let kind = match err.kind() {
        ErrorKind::NotFound => io::ErrorKind::NotFound,
        ErrorKind::SeekOutOfBounds => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}
