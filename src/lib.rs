//! `seekable`: random access to remote media over HTTP range requests.
//!
//! This crate provides:
//! - A seekable byte source backed by `Range` requests, with size discovery and memoization
//! - A demux engine contract and a bundled Symphonia engine
//! - Point lookups ("the packet at t seconds") and pull-based packet streams with backpressure
//!
//! Most consumers should start with [`MediaSession`].

// High-level API (most consumers should start here).
pub mod opts;
pub mod session;

// Remote byte access.
pub mod remote_source;
pub mod transport;

// Demux engine contract, its init-once loader and the bundled engines.
pub mod backends;
pub mod bootstrap;
pub mod engine;

// Packets, stream descriptors and the packet stream bridge.
pub mod media;
pub mod packet_channel;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use backends::symphonia::SymphoniaEngine;
pub use bootstrap::Bootstrap;
pub use engine::{ContextHandle, DemuxEngine, PacketQuery, PacketRange, PacketSink, StreamSelector};
pub use error::{Error, ErrorKind, Result};
pub use media::{MediaInfo, MediaKind, Packet, SeekDirection, StreamDescriptor};
pub use opts::SessionOpts;
pub use packet_channel::PacketChannel;
pub use remote_source::{ByteSource, RemoteByteSource, SourceSize, Whence};
pub use session::MediaSession;
pub use transport::{HttpResponse, HttpTransport, RangeSpec, ReqwestTransport};
