//! Demux engine built on Symphonia.
//!
//! Symphonia is synchronous, so every call that touches a container runs on tokio's blocking
//! pool. Each open context is a [`Demuxer`] behind its own mutex next to the stream snapshot
//! taken at probe time; the arena only guards handle bookkeeping and is never held across
//! demux work.

mod demux;
mod io;

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::debug;

use crate::bootstrap::Bootstrap;
use crate::engine::{
    ContextArena, ContextHandle, DemuxEngine, PacketQuery, PacketRange, PacketSink,
};
use crate::error::{Error, ErrorKind, Result};
use crate::media::{MediaInfo, Packet};
use crate::remote_source::ByteSource;

use demux::Demuxer;
use io::BlockingSource;

struct OpenContext {
    info: MediaInfo,
    demuxer: Mutex<Demuxer>,
}

type Context = Arc<OpenContext>;

#[derive(Default)]
pub struct SymphoniaEngine {
    contexts: Mutex<ContextArena<Context>>,
}

impl SymphoniaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide engine load, shared by every session that asks for it.
    pub fn bootstrap() -> Bootstrap<SymphoniaEngine> {
        static BOOTSTRAP: OnceLock<Bootstrap<SymphoniaEngine>> = OnceLock::new();

        BOOTSTRAP
            .get_or_init(|| {
                Bootstrap::new(async {
                    // Force the lazily built registries now rather than on the first open.
                    let _ = ::symphonia::default::get_probe();
                    let _ = ::symphonia::default::get_codecs();
                    Ok(SymphoniaEngine::new())
                })
            })
            .clone()
    }

    /// Number of open contexts.
    pub fn open_contexts(&self) -> usize {
        self.arena().len()
    }

    fn arena(&self) -> MutexGuard<'_, ContextArena<Context>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self, ctx: ContextHandle) -> Result<Context> {
        self.arena()
            .get(ctx)
            .cloned()
            .ok_or_else(invalid_handle)
    }
}

#[async_trait]
impl DemuxEngine for SymphoniaEngine {
    async fn open(
        &self,
        source: Box<dyn ByteSource>,
        buffer_size: usize,
    ) -> Result<Option<ContextHandle>> {
        let runtime = Handle::current();
        let demuxer = tokio::task::spawn_blocking(move || -> Result<Demuxer> {
            let source = BlockingSource::new(source, runtime)?;
            Ok(Demuxer::probe(source, buffer_size)?)
        })
        .await
        .map_err(join_error)??;

        debug!(streams = demuxer.info().streams.len(), "container probed");
        let context = OpenContext {
            info: demuxer.info().clone(),
            demuxer: Mutex::new(demuxer),
        };
        let handle = self.arena().insert(Arc::new(context));
        Ok(Some(handle))
    }

    fn media_info(&self, ctx: ContextHandle) -> Result<MediaInfo> {
        Ok(self.context(ctx)?.info.clone())
    }

    async fn packet_at(&self, ctx: ContextHandle, query: PacketQuery) -> Result<Option<Packet>> {
        let context = self.context(ctx)?;

        tokio::task::spawn_blocking(move || -> Result<Option<Packet>> {
            let mut demuxer = lock(&context.demuxer);
            let stream = demuxer.find_stream(query.kind, query.stream)?;
            demuxer.seek(stream, query.timestamp_seconds, query.direction)?;
            Ok(demuxer.next_packet_for(stream)?)
        })
        .await
        .map_err(join_error)?
    }

    async fn extract_packets(
        &self,
        ctx: ContextHandle,
        range: PacketRange,
        mut sink: Box<dyn PacketSink>,
    ) -> Result<()> {
        let context = self.context(ctx)?;
        let runtime = Handle::current();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut demuxer = lock(&context.demuxer);
            let stream = demuxer.find_stream(range.kind, range.stream)?;

            if range.start_seconds > 0.0 {
                demuxer.seek(stream, range.start_seconds, range.direction)?;
            }

            let mut delivered = 0usize;
            while let Some(packet) = demuxer.next_packet_for(stream)? {
                if range.end_seconds > 0.0 && packet.timestamp_seconds > range.end_seconds {
                    break;
                }
                delivered += 1;
                // Parks this blocking thread while the consumer's queue is full.
                if !runtime.block_on(sink.deliver(Some(packet))) {
                    debug!(delivered, "consumer went away; ending pass");
                    break;
                }
            }

            runtime.block_on(sink.deliver(None));
            debug!(delivered, "extraction pass complete");
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    fn close(&self, ctx: ContextHandle) {
        if self.arena().remove(ctx).is_none() {
            debug!(?ctx, "close on unknown context ignored");
        }
    }
}

fn lock(context: &Mutex<Demuxer>) -> MutexGuard<'_, Demuxer> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

fn invalid_handle() -> Error {
    Error::new(ErrorKind::NotLoaded, "Invalid context handle")
}

fn join_error(err: JoinError) -> Error {
    Error::engine(format!("demux task failed: {err}")).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handles_are_rejected() {
        let engine = SymphoniaEngine::new();
        let foreign = ContextArena::<()>::new().insert(());

        let err = engine.media_info(foreign).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotLoaded);

        engine.close(foreign);
        assert_eq!(engine.open_contexts(), 0);
    }

    #[tokio::test]
    async fn bootstrap_is_shared_process_wide() {
        let a = SymphoniaEngine::bootstrap().engine().await.unwrap();
        let b = SymphoniaEngine::bootstrap().engine().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
