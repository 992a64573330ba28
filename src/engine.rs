// src/engine.rs

//! The demux engine contract.
//!
//! An engine parses containers and extracts packets; this crate only feeds it bytes (through a
//! [`ByteSource`]) and collects what it produces. Engines own their per-source state and hand
//! out [`ContextHandle`]s; a [`ContextArena`] gives them generation-checked storage so a stale
//! handle is rejected instead of aliasing a newer context.

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{MediaInfo, MediaKind, Packet, SeekDirection};
use crate::remote_source::ByteSource;

/// Opaque token for one open demux context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    index: u32,
    generation: u32,
}

/// Which stream of the wanted kind to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamSelector {
    /// Let the engine pick (the first stream of the kind).
    #[default]
    Best,
    Index(usize),
}

/// A single-packet lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketQuery {
    pub kind: MediaKind,
    pub stream: StreamSelector,
    pub timestamp_seconds: f64,
    pub direction: SeekDirection,
}

/// The window of one demux pass.
///
/// `start_seconds <= 0` reads from the current position; `end_seconds <= 0` reads to the end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRange {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub kind: MediaKind,
    pub stream: StreamSelector,
    pub direction: SeekDirection,
}

/// Receiver handed to [`DemuxEngine::extract_packets`].
#[async_trait]
pub trait PacketSink: Send {
    /// Hand over one packet, or `None` as the end-of-pass sentinel.
    ///
    /// Waits while the consumer's buffer is full. Returns whether more packets are welcome;
    /// `false` means the consumer is gone and engines must stop the pass. The sentinel always
    /// answers `false`.
    async fn deliver(&mut self, packet: Option<Packet>) -> bool;
}

#[async_trait]
pub trait DemuxEngine: Send + Sync + 'static {
    /// Open a demux context reading through `source`.
    ///
    /// `Ok(None)` is the engine's null handle: it could not open the source but did not raise.
    async fn open(
        &self,
        source: Box<dyn ByteSource>,
        buffer_size: usize,
    ) -> Result<Option<ContextHandle>>;

    fn media_info(&self, ctx: ContextHandle) -> Result<MediaInfo>;

    /// Seek to the query's timestamp and return the first packet of the wanted stream.
    ///
    /// `Ok(None)` means no packet exists there.
    async fn packet_at(&self, ctx: ContextHandle, query: PacketQuery) -> Result<Option<Packet>>;

    /// Run one pass over `range`, calling `sink` once per packet in extraction order.
    async fn extract_packets(
        &self,
        ctx: ContextHandle,
        range: PacketRange,
        sink: Box<dyn PacketSink>,
    ) -> Result<()>;

    /// Release a context. Unknown or stale handles are ignored.
    fn close(&self, ctx: ContextHandle);
}

/// Slot storage that issues [`ContextHandle`]s.
///
/// Removing a value bumps its slot's generation, so handles issued before the removal no
/// longer resolve even after the slot is reused.
#[derive(Debug)]
pub struct ContextArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> ContextArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> ContextHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ContextHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ContextHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ContextHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn remove(&mut self, handle: ContextHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(value)
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ContextArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
