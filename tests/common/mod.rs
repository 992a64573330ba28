#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use seekable::engine::ContextArena;
use seekable::transport::TransportFailure;
use seekable::{
    Bootstrap, ByteSource, ContextHandle, DemuxEngine, Error, ErrorKind, HttpResponse,
    HttpTransport, MediaInfo, MediaKind, MediaSession, Packet, PacketQuery, PacketRange,
    PacketSink, RangeSpec, SessionOpts, SourceSize, StreamDescriptor,
};

// ---------------------------------------------------------------------------------------------
// In-memory HTTP server
// ---------------------------------------------------------------------------------------------

/// One resource served by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct Resource {
    pub data: Bytes,
    pub status: u16,
    pub accept_ranges: Option<String>,
    pub advertise_length: bool,
    pub advertise_total: bool,
    pub fail_reads: bool,
    pub fail_heads: bool,
    /// Status for every ranged GET, overriding `status`.
    pub get_status: Option<u16>,
    /// Cap on GET body length.
    pub short_bodies: Option<usize>,
    /// Answer ranged GETs through to the end of the resource.
    pub ignore_range_end: bool,
}

impl Resource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            status: 200,
            accept_ranges: Some("bytes".to_owned()),
            advertise_length: true,
            advertise_total: true,
            fail_reads: false,
            fail_heads: false,
            get_status: None,
            short_bodies: None,
            ignore_range_end: false,
        }
    }

    pub fn zeros(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    pub fn without_range_support(mut self) -> Self {
        self.accept_ranges = None;
        self
    }

    pub fn with_accept_ranges(mut self, value: &str) -> Self {
        self.accept_ranges = Some(value.to_owned());
        self
    }

    /// No `Content-Length` on `HEAD`, forcing the one-byte ranged GET.
    pub fn without_content_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }

    /// `Content-Range` totals reported as `*`.
    pub fn with_unknown_total(mut self) -> Self {
        self.advertise_total = false;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Ranged GETs fail below the HTTP layer.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// `HEAD` fails below the HTTP layer.
    pub fn failing_heads(mut self) -> Self {
        self.fail_heads = true;
        self
    }

    /// `HEAD` keeps its status; ranged GETs answer with `status`.
    pub fn with_get_status(mut self, status: u16) -> Self {
        self.get_status = Some(status);
        self
    }

    /// Bodies are cut to at most `max` bytes, whatever the range asked for.
    pub fn with_short_bodies(mut self, max: usize) -> Self {
        self.short_bodies = Some(max);
        self
    }

    /// The range end is ignored, as by servers that stream the rest of the file.
    pub fn ignoring_range_end(mut self) -> Self {
        self.ignore_range_end = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Head(String),
    Get(String, RangeSpec),
}

#[derive(Default)]
pub struct MockTransport {
    resources: Mutex<HashMap<String, Resource>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, resource: Resource) {
        self.resources
            .lock()
            .unwrap()
            .insert(url.to_owned(), resource);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn head_count(&self, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, Request::Head(u) if u == url))
            .count()
    }

    pub fn get_count(&self, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, Request::Get(u, _) if u == url))
            .count()
    }

    fn lookup(&self, url: &str) -> Option<Resource> {
        self.resources.lock().unwrap().get(url).cloned()
    }
}

fn not_found() -> HttpResponse {
    HttpResponse {
        status: 404,
        reason: Some("Not Found".to_owned()),
        ..HttpResponse::default()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn head(&self, url: &str) -> Result<HttpResponse, TransportFailure> {
        self.requests
            .lock()
            .unwrap()
            .push(Request::Head(url.to_owned()));

        let Some(resource) = self.lookup(url) else {
            return Ok(not_found());
        };
        if resource.fail_heads {
            return Err("connection refused".into());
        }

        Ok(HttpResponse {
            status: resource.status,
            reason: None,
            content_length: resource
                .advertise_length
                .then_some(resource.data.len() as u64),
            accept_ranges: resource.accept_ranges.clone(),
            content_range: None,
            body: Bytes::new(),
        })
    }

    async fn get_range(
        &self,
        url: &str,
        range: RangeSpec,
    ) -> Result<HttpResponse, TransportFailure> {
        self.requests
            .lock()
            .unwrap()
            .push(Request::Get(url.to_owned(), range));

        let Some(resource) = self.lookup(url) else {
            return Ok(not_found());
        };
        if resource.fail_reads {
            return Err("connection reset by peer".into());
        }
        let status = resource.get_status.unwrap_or(resource.status);
        if status == 404 {
            return Ok(not_found());
        }
        if !(200..300).contains(&status) {
            return Ok(HttpResponse {
                status,
                ..HttpResponse::default()
            });
        }

        let len = resource.data.len() as u64;
        if range.start >= len {
            return Ok(HttpResponse {
                status: 416,
                reason: Some("Range Not Satisfiable".to_owned()),
                ..HttpResponse::default()
            });
        }

        let mut last = match range.end {
            Some(end) if !resource.ignore_range_end => end.min(len - 1),
            _ => len - 1,
        };
        if let Some(max) = resource.short_bodies {
            last = last.min(range.start + max as u64 - 1);
        }
        let total = if resource.advertise_total {
            len.to_string()
        } else {
            "*".to_owned()
        };

        Ok(HttpResponse {
            status: 206,
            reason: Some("Partial Content".to_owned()),
            content_length: Some(last - range.start + 1),
            accept_ranges: resource.accept_ranges.clone(),
            content_range: Some(format!("bytes {}-{}/{}", range.start, last, total)),
            body: resource.data.slice(range.start as usize..=last as usize),
        })
    }
}

// ---------------------------------------------------------------------------------------------
// Scripted demux engine
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenBehavior {
    #[default]
    Succeed,
    /// Return the engine's null handle.
    NoContext,
    Raise,
}

/// What a [`ScriptedEngine`] does on each call.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub open: OpenBehavior,
    pub media_info: MediaInfo,
    pub packets: Vec<Packet>,
    /// Deliver this many packets, then fail the pass.
    pub fail_after: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Opened { ctx: ContextHandle, size: SourceSize },
    Closed { ctx: ContextHandle },
}

#[derive(Debug, Default)]
struct EngineState {
    contexts: ContextArena<()>,
    events: Vec<Event>,
    passes: usize,
    accepted: usize,
    sentinel_replies: Vec<bool>,
}

/// A [`DemuxEngine`] that serves a fixed packet list and records what it was asked to do.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    script: Script,
    state: Mutex<EngineState>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            state: Mutex::default(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().unwrap().contexts.len()
    }

    pub fn passes(&self) -> usize {
        self.state.lock().unwrap().passes
    }

    /// Packets the sink took, across all passes.
    pub fn accepted(&self) -> usize {
        self.state.lock().unwrap().accepted
    }

    /// What each end-of-pass sentinel delivery answered.
    pub fn sentinel_replies(&self) -> Vec<bool> {
        self.state.lock().unwrap().sentinel_replies.clone()
    }

    fn check(&self, ctx: ContextHandle) -> seekable::Result<()> {
        match self.state.lock().unwrap().contexts.get(ctx) {
            Some(()) => Ok(()),
            None => Err(Error::new(ErrorKind::NotLoaded, "Invalid context handle")),
        }
    }

    fn in_window(packet: &Packet, range: &PacketRange) -> bool {
        let after_start =
            range.start_seconds <= 0.0 || packet.timestamp_seconds >= range.start_seconds;
        let before_end = range.end_seconds <= 0.0 || packet.timestamp_seconds <= range.end_seconds;
        after_start && before_end
    }
}

#[async_trait]
impl DemuxEngine for ScriptedEngine {
    async fn open(
        &self,
        mut source: Box<dyn ByteSource>,
        _buffer_size: usize,
    ) -> seekable::Result<Option<ContextHandle>> {
        let size = source.size().await?;
        match self.script.open {
            OpenBehavior::Succeed => {}
            OpenBehavior::NoContext => return Ok(None),
            OpenBehavior::Raise => {
                return Err(Error::new(ErrorKind::Engine, "Cannot open input source"));
            }
        }

        let mut state = self.state.lock().unwrap();
        let ctx = state.contexts.insert(());
        state.events.push(Event::Opened { ctx, size });
        Ok(Some(ctx))
    }

    fn media_info(&self, ctx: ContextHandle) -> seekable::Result<MediaInfo> {
        self.check(ctx)?;
        Ok(self.script.media_info.clone())
    }

    async fn packet_at(
        &self,
        ctx: ContextHandle,
        query: PacketQuery,
    ) -> seekable::Result<Option<Packet>> {
        self.check(ctx)?;
        Ok(self
            .script
            .packets
            .iter()
            .filter(|p| p.timestamp_seconds <= query.timestamp_seconds)
            .last()
            .cloned())
    }

    async fn extract_packets(
        &self,
        ctx: ContextHandle,
        range: PacketRange,
        mut sink: Box<dyn PacketSink>,
    ) -> seekable::Result<()> {
        self.check(ctx)?;
        self.state.lock().unwrap().passes += 1;

        let window = self
            .script
            .packets
            .iter()
            .filter(|p| Self::in_window(p, &range));

        for (delivered, packet) in window.enumerate() {
            if self.script.fail_after == Some(delivered) {
                return Err(Error::new(ErrorKind::Engine, "Failed to read frame"));
            }
            if !sink.deliver(Some(packet.clone())).await {
                break;
            }
            self.state.lock().unwrap().accepted += 1;
        }
        if self.script.fail_after.is_some() {
            return Err(Error::new(ErrorKind::Engine, "Failed to read frame"));
        }

        let reply = sink.deliver(None).await;
        self.state.lock().unwrap().sentinel_replies.push(reply);
        Ok(())
    }

    fn close(&self, ctx: ContextHandle) {
        let mut state = self.state.lock().unwrap();
        if state.contexts.remove(ctx).is_some() {
            state.events.push(Event::Closed { ctx });
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------------------------

pub fn audio_packet(index: usize) -> Packet {
    let payload = Bytes::from(vec![index as u8; 100]);
    Packet {
        stream_index: 0,
        codec_name: "mp3".to_owned(),
        is_keyframe: true,
        timestamp_seconds: index as f64 * 0.5,
        duration_seconds: 0.5,
        byte_length: payload.len(),
        payload,
    }
}

pub fn audio_packets(count: usize) -> Vec<Packet> {
    (0..count).map(audio_packet).collect()
}

pub fn mp3_info() -> MediaInfo {
    MediaInfo {
        streams: vec![StreamDescriptor {
            index: 0,
            media_kind: MediaKind::Audio,
            codec_name: "mp3".to_owned(),
            mime_type: "audio/mpeg".to_owned(),
            channels: Some(2),
            sample_rate: Some(44_100),
            start_seconds: Some(0.0),
            duration_seconds: Some(10.0),
            frames: Some(441_000),
            bits_per_sample: None,
            sample_format: None,
            extradata: Bytes::new(),
        }],
        duration_seconds: Some(10.0),
        start_seconds: Some(0.0),
        tags: [("TITLE".to_owned(), "Ten Seconds".to_owned())].into(),
    }
}

/// A session over a scripted engine and an in-memory server.
pub async fn scripted_session(
    script: Script,
    opts: SessionOpts,
) -> (MediaSession<ScriptedEngine>, Arc<ScriptedEngine>, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let bootstrap = Bootstrap::ready(ScriptedEngine::new(script));
    let engine = bootstrap
        .engine()
        .await
        .expect("ready bootstrap never fails");
    let session = MediaSession::with_engine(bootstrap, transport.clone(), opts);
    (session, engine, transport)
}
