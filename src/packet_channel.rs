// src/packet_channel.rs

//! Pull-based packet stream over the engine's push-style delivery.
//!
//! The engine runs a demux pass and hands each packet to a sink. The sink feeds a bounded
//! queue and waits while it holds `high_water_mark` packets, so the engine runs at most that
//! far ahead of the consumer. The consumer side is an ordinary [`Stream`]: polling drives the
//! pass forward and drains the queue.
//!
//! Termination:
//! - pass succeeded: queued packets, then `None`
//! - pass failed: queued packets, then one `Err`, then the stream is fused
//!
//! Dropping the channel closes the queue; a waiting engine sees `false` and stops.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FusedStream, Stream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{ContextHandle, DemuxEngine, PacketRange, PacketSink};
use crate::error::{Error, Result};
use crate::media::Packet;

pub struct PacketChannel<E> {
    engine: Arc<E>,
    context: ContextHandle,
    range: PacketRange,
    mime_type: String,
    high_water_mark: usize,
    // Created with the pass; closed once the pass drops its sink.
    queue: Option<mpsc::Receiver<Packet>>,
    // In flight while `Some`; at most one per channel.
    pass: Option<BoxFuture<'static, Result<()>>>,
    failure: Option<Error>,
    finished: bool,
    terminated: bool,
}

impl<E: DemuxEngine> PacketChannel<E> {
    /// A channel that will run one pass over `range` the first time it is polled.
    ///
    /// `high_water_mark` is clamped to at least one packet.
    pub fn new(
        engine: Arc<E>,
        context: ContextHandle,
        range: PacketRange,
        mime_type: impl Into<String>,
        high_water_mark: usize,
    ) -> Self {
        Self {
            engine,
            context,
            range,
            mime_type: mime_type.into(),
            high_water_mark: high_water_mark.max(1),
            queue: None,
            pass: None,
            failure: None,
            finished: false,
            terminated: false,
        }
    }

    /// MIME type of the stream this channel targets.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Whether a demux pass is currently in flight.
    pub fn is_pending(&self) -> bool {
        self.pass.is_some()
    }

    /// Whether the pass has completed (successfully or not). One-way.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn start_pass(&mut self) {
        debug!(
            start = self.range.start_seconds,
            end = self.range.end_seconds,
            kind = ?self.range.kind,
            high_water_mark = self.high_water_mark,
            "starting demux pass"
        );

        let (sender, receiver) = mpsc::channel(self.high_water_mark);
        self.queue = Some(receiver);

        let engine = Arc::clone(&self.engine);
        let context = self.context;
        let range = self.range;
        let sink = Box::new(ChannelSink { sender });

        self.pass = Some(async move { engine.extract_packets(context, range, sink).await }.boxed());
    }

    fn poll_pass(&mut self, cx: &mut Context<'_>) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        let Poll::Ready(outcome) = pass.as_mut().poll(cx) else {
            return;
        };

        // Cleared on both paths before anything else is observed.
        self.pass = None;
        self.finished = true;

        match outcome {
            Ok(()) => debug!("demux pass finished"),
            Err(err) => {
                warn!(error = %err, "demux pass failed");
                self.failure = Some(err);
            }
        }
    }
}

impl<E: DemuxEngine> Stream for PacketChannel<E> {
    type Item = Result<Packet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        if this.queue.is_none() {
            this.start_pass();
        }

        // Engines that deliver inline make progress here; off-thread engines are woken through
        // the queue.
        this.poll_pass(cx);

        let queued = match this.queue.as_mut() {
            Some(queue) => queue.poll_recv(cx),
            None => Poll::Ready(None),
        };

        match queued {
            Poll::Ready(Some(packet)) => Poll::Ready(Some(Ok(packet))),
            // The sink is gone; wait for the pass itself to settle.
            Poll::Ready(None) if !this.finished => Poll::Pending,
            Poll::Ready(None) => {
                this.terminated = true;
                this.queue = None;
                Poll::Ready(this.failure.take().map(Err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E: DemuxEngine> FusedStream for PacketChannel<E> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

struct ChannelSink {
    sender: mpsc::Sender<Packet>,
}

#[async_trait]
impl PacketSink for ChannelSink {
    async fn deliver(&mut self, packet: Option<Packet>) -> bool {
        let Some(packet) = packet else {
            return false;
        };
        self.sender.send(packet).await.is_ok()
    }
}
