use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Seekable's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, independent of the message wording.
///
/// Callers should branch on the kind rather than on `Display` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote server answered 404.
    NotFound,
    /// The server does not advertise `Accept-Ranges: bytes`.
    RangeUnsupported,
    /// A non-success, non-404 HTTP status, or no response at all while resolving size.
    TransportError,
    /// The transport failed while fetching a chunk (connection reset, truncated body).
    ReadError,
    /// A seek target below zero or past the end of a bounded resource.
    SeekOutOfBounds,
    /// The demux engine could not be initialized.
    EngineBootstrapFailed,
    /// The engine raised, or handed back no context, while opening a source.
    SourceOpenFailed,
    /// The operation needs a loaded source and there is none.
    NotLoaded,
    /// The engine failed inside a query or a demux pass.
    Engine,
}

impl ErrorKind {
    /// Stable machine-readable code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "FILE_NOT_FOUND",
            ErrorKind::RangeUnsupported => "RANGE_NOT_SUPPORTED",
            ErrorKind::TransportError => "NETWORK_ERROR",
            ErrorKind::ReadError => "FILE_READ_ERROR",
            ErrorKind::SeekOutOfBounds => "SEEK_OUT_OF_BOUNDS",
            ErrorKind::EngineBootstrapFailed => "ENGINE_BOOTSTRAP_FAILED",
            ErrorKind::SourceOpenFailed => "SOURCE_OPEN_FAILED",
            ErrorKind::NotLoaded => "NOT_LOADED",
            ErrorKind::Engine => "ENGINE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Seekable's crate-wide error type.
///
/// Carries a kind, a human-readable message and, for resource-related failures, the URL
/// that was being accessed. The type is `Clone` so a single bootstrap failure can be handed
/// to every task that awaited it; underlying causes are therefore kept behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    url: Option<String>,
    #[source]
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The URL of the remote resource involved, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.source = Some(Arc::from(source.into()));
        self
    }

    pub(crate) fn not_loaded() -> Self {
        Self::new(ErrorKind::NotLoaded, "no source is loaded; call `load` first")
    }

    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Engine, message)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::engine(format!("{err:#}"))
    }
}
