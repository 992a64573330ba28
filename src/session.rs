//! High-level API: one remote source, one demux context, point and streaming access.
//!
//! A [`MediaSession`] owns at most one bound (byte source, demux context) pair. Loading a new
//! URL tears the previous pair down before the new one is opened, so two contexts are never
//! alive for the same session.
//!
//! Every async operation first awaits the engine bootstrap, which is shared by all sessions
//! built from the same [`Bootstrap`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::backends::symphonia::SymphoniaEngine;
use crate::bootstrap::Bootstrap;
use crate::engine::{ContextHandle, DemuxEngine, PacketQuery, PacketRange};
use crate::error::{Error, ErrorKind, Result};
use crate::media::{MediaInfo, Packet};
use crate::opts::SessionOpts;
use crate::packet_channel::PacketChannel;
use crate::remote_source::{ByteSource, RemoteByteSource};
use crate::transport::{HttpTransport, ReqwestTransport};

pub struct MediaSession<E: DemuxEngine = SymphoniaEngine> {
    bootstrap: Bootstrap<E>,
    transport: Arc<dyn HttpTransport>,
    opts: SessionOpts,
    bound: Option<Binding<E>>,
}

struct Binding<E> {
    engine: Arc<E>,
    context: ContextHandle,
    url: String,
    // Captured once at load; streams read it synchronously.
    media_info: MediaInfo,
}

impl<E> Binding<E> {
    fn tag(&self, err: Error) -> Error {
        if err.url().is_some() {
            err
        } else {
            err.with_url(self.url.clone())
        }
    }
}

impl MediaSession<SymphoniaEngine> {
    /// A session on the bundled symphonia engine over a default `reqwest` client.
    pub fn new() -> Result<Self> {
        let transport = ReqwestTransport::new().map_err(|e| {
            Error::new(
                ErrorKind::TransportError,
                format!("failed to build HTTP client: {e}"),
            )
            .with_source(e)
        })?;

        Ok(Self::with_engine(
            SymphoniaEngine::bootstrap(),
            Arc::new(transport),
            SessionOpts::default(),
        ))
    }
}

impl<E: DemuxEngine> MediaSession<E> {
    pub fn with_engine(
        bootstrap: Bootstrap<E>,
        transport: Arc<dyn HttpTransport>,
        opts: SessionOpts,
    ) -> Self {
        Self {
            bootstrap,
            transport,
            opts,
            bound: None,
        }
    }

    pub fn opts(&self) -> &SessionOpts {
        &self.opts
    }

    pub fn is_loaded(&self) -> bool {
        self.bound.is_some()
    }

    /// URL of the bound source, if any.
    pub fn url(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.url.as_str())
    }

    /// Bind the session to `url`, replacing any previous binding.
    ///
    /// The resource's size is resolved before the engine sees it, so a missing file or a
    /// server without range support fails here with the URL attached. On any error the session
    /// is left unbound.
    pub async fn load(&mut self, url: impl Into<String>, buffer_size: usize) -> Result<()> {
        let engine = self.bootstrap.engine().await?;
        self.destroy();

        let url = url.into();
        info!(url = %url, buffer_size, "loading source");

        let mut source = RemoteByteSource::new(url.clone(), Arc::clone(&self.transport));
        source.size().await?;

        let context = match engine.open(Box::new(source), buffer_size).await {
            Ok(Some(context)) => context,
            Ok(None) => {
                return Err(Error::new(
                    ErrorKind::SourceOpenFailed,
                    "Failed to open source: the engine returned no context. Check URL and network.",
                )
                .with_url(url));
            }
            Err(err) => {
                return Err(Error::new(
                    ErrorKind::SourceOpenFailed,
                    format!("Failed to open source via demux engine: {err}"),
                )
                .with_url(url)
                .with_source(err));
            }
        };

        let media_info = match engine.media_info(context) {
            Ok(info) => info,
            Err(err) => {
                engine.close(context);
                return Err(err.with_url(url));
            }
        };

        debug!(url = %url, streams = media_info.streams.len(), "source loaded");
        self.bound = Some(Binding {
            engine,
            context,
            url,
            media_info,
        });
        Ok(())
    }

    /// Stream descriptors of the bound source, as reported by the engine.
    pub async fn media_info(&self) -> Result<MediaInfo> {
        let binding = self.ready().await?;
        binding
            .engine
            .media_info(binding.context)
            .map_err(|e| binding.tag(e))
    }

    /// The packet at or before `timestamp_seconds` on the configured media kind.
    ///
    /// `Ok(None)` when the engine finds nothing there.
    pub async fn packet_at(&self, timestamp_seconds: f64) -> Result<Option<Packet>> {
        let binding = self.ready().await?;
        let query = PacketQuery {
            kind: self.opts.media_kind,
            stream: self.opts.stream,
            timestamp_seconds,
            direction: self.opts.seek_direction,
        };
        binding
            .engine
            .packet_at(binding.context, query)
            .await
            .map_err(|e| binding.tag(e))
    }

    /// A fresh packet stream over `[start_seconds, end_seconds]`.
    ///
    /// `end_seconds <= 0` streams to the end. The channel's MIME type comes from the first
    /// stream of the configured kind in the snapshot taken at load time.
    pub fn create_av_stream(
        &self,
        start_seconds: f64,
        end_seconds: f64,
    ) -> Result<PacketChannel<E>> {
        let binding = self.bound.as_ref().ok_or_else(Error::not_loaded)?;
        let mime_type = binding.media_info.mime_type_for(self.opts.media_kind);

        let range = PacketRange {
            start_seconds,
            end_seconds,
            kind: self.opts.media_kind,
            stream: self.opts.stream,
            direction: self.opts.seek_direction,
        };

        Ok(PacketChannel::new(
            Arc::clone(&binding.engine),
            binding.context,
            range,
            mime_type,
            self.opts.high_water_mark,
        ))
    }

    /// Release the bound context, if any. Safe to call repeatedly.
    ///
    /// Streams created earlier fail with `NotLoaded` on their next pass.
    pub fn destroy(&mut self) {
        if let Some(binding) = self.bound.take() {
            info!(url = %binding.url, "closing source");
            binding.engine.close(binding.context);
        }
    }

    async fn ready(&self) -> Result<&Binding<E>> {
        self.bootstrap.engine().await?;
        self.bound.as_ref().ok_or_else(Error::not_loaded)
    }
}

impl<E: DemuxEngine> Drop for MediaSession<E> {
    fn drop(&mut self) {
        self.destroy();
    }
}
