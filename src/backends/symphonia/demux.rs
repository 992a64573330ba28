// src/backends/symphonia/demux.rs

//! Demux helpers for Symphonia.
//!
//! This module keeps container probing, stream description and packet iteration isolated from
//! the engine's context bookkeeping.
//!
//! Responsibilities:
//! - Probe a `MediaSource` and describe every track it exposes
//! - Seek by time and pull packets for one wanted stream
//! - Convert Symphonia packets into crate [`Packet`]s with timestamps in seconds

use std::collections::BTreeMap;
use std::io;

use ::symphonia::core::codecs::{
    CODEC_TYPE_AAC, CODEC_TYPE_EAC3, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_NULL,
    CODEC_TYPE_OPUS, CODEC_TYPE_PCM_ALAW, CODEC_TYPE_PCM_MULAW, CODEC_TYPE_PCM_S16BE,
    CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_U16BE, CODEC_TYPE_PCM_U16LE, CODEC_TYPE_VORBIS,
    CodecType, decl_codec_type,
};
use ::symphonia::core::errors::Error as SymphoniaError;
use ::symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use ::symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use ::symphonia::core::meta::{MetadataOptions, MetadataRevision};
use ::symphonia::core::probe::Hint;
use ::symphonia::core::units::{Time, TimeBase};
use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;

use super::io::BlockingSource;
use crate::engine::StreamSelector;
use crate::media::{FALLBACK_MIME_TYPE, MediaInfo, MediaKind, Packet, SeekDirection, StreamDescriptor};

/// Smallest stream buffer Symphonia accepts (it must exceed its 32 KiB read block).
const MIN_STREAM_BUFFER_LEN: usize = 64 * 1024;

/// Plain AC-3. Symphonia only declares the shared E-AC-3 type; readers that tell the two apart
/// use this one.
pub(crate) const CODEC_TYPE_AC3: CodecType = decl_codec_type(b"ac3");

/// One opened container.
pub(crate) struct Demuxer {
    format: Box<dyn FormatReader>,
    info: MediaInfo,
    tracks: Vec<TrackMeta>,
}

struct TrackMeta {
    id: u32,
    time_base: Option<TimeBase>,
}

impl Demuxer {
    /// Probe the container behind `source`.
    ///
    /// `buffer_size` is the caller's read-ahead preference; it is rounded up to what
    /// Symphonia's `MediaSourceStream` requires.
    pub(crate) fn probe(source: BlockingSource, buffer_size: usize) -> Result<Self> {
        let mss_opts = MediaSourceStreamOptions {
            buffer_len: stream_buffer_len(buffer_size),
        };
        let mss = MediaSourceStream::new(Box::new(source), mss_opts);

        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();

        let mut probed = ::symphonia::default::get_probe()
            .format(&Hint::new(), mss, &format_opts, &metadata_opts)
            .map_err(|e| anyhow!(e))
            .context("failed to probe media stream")?;

        // Tags found ahead of the container (ID3v2 and friends) first, then the container's own.
        let mut tags = BTreeMap::new();
        if let Some(metadata) = probed.metadata.get() {
            collect_tags(metadata.current(), &mut tags);
        }
        let mut format = probed.format;
        collect_tags(format.metadata().current(), &mut tags);

        let mut streams = Vec::with_capacity(format.tracks().len());
        let mut tracks = Vec::with_capacity(format.tracks().len());

        for (index, track) in format.tracks().iter().enumerate() {
            streams.push(describe_track(index, track));
            tracks.push(TrackMeta {
                id: track.id,
                time_base: track.codec_params.time_base,
            });
        }

        let duration_seconds = streams
            .iter()
            .filter_map(|s| s.duration_seconds)
            .reduce(f64::max);
        let start_seconds = streams
            .iter()
            .filter_map(|s| s.start_seconds)
            .reduce(f64::min);

        Ok(Self {
            format,
            info: MediaInfo {
                streams,
                duration_seconds,
                start_seconds,
                tags,
            },
            tracks,
        })
    }

    pub(crate) fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Resolve a stream selector against the wanted media kind.
    pub(crate) fn find_stream(&self, kind: MediaKind, selector: StreamSelector) -> Result<usize> {
        let found = match selector {
            StreamSelector::Best => self.info.first_of_kind(kind).map(|s| s.index),
            StreamSelector::Index(index) => self
                .info
                .streams
                .get(index)
                .filter(|s| s.media_kind == kind)
                .map(|s| s.index),
        };
        found.ok_or_else(|| anyhow!("cannot find wanted {kind:?} stream in the input"))
    }

    /// Reposition the container so the next packet of `stream` is at (or, for backward seeks,
    /// before) `seconds`.
    pub(crate) fn seek(&mut self, stream: usize, seconds: f64, direction: SeekDirection) -> Result<()> {
        let mode = match direction {
            SeekDirection::Backward => SeekMode::Accurate,
            SeekDirection::Nearest => SeekMode::Coarse,
        };
        let to = SeekTo::Time {
            time: Time::from(seconds.max(0.0)),
            track_id: Some(self.tracks[stream].id),
        };

        self.format
            .seek(mode, to)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("cannot seek to the specified timestamp ({seconds:.3}s)"))?;
        Ok(())
    }

    /// Next packet belonging to `stream`, or `None` at end of stream.
    pub(crate) fn next_packet_for(&mut self, stream: usize) -> Result<Option<Packet>> {
        let wanted = self.tracks[stream].id;
        loop {
            let Some(packet) = next_packet(self.format.as_mut())? else {
                return Ok(None);
            };
            if packet.track_id() != wanted {
                continue;
            }
            return Ok(Some(self.to_packet(stream, packet)));
        }
    }

    fn to_packet(&self, stream: usize, packet: ::symphonia::core::formats::Packet) -> Packet {
        let time_base = self.tracks[stream].time_base;
        let timestamp_seconds = time_base.map_or(0.0, |tb| seconds(tb, packet.ts()));
        let duration_seconds = time_base.map_or(0.0, |tb| seconds(tb, packet.dur()));
        let payload = Bytes::from(packet.data);

        Packet {
            stream_index: stream,
            codec_name: self.info.streams[stream].codec_name.clone(),
            // Symphonia does not flag sync samples; every audio packet it yields is
            // independently decodable.
            is_keyframe: true,
            timestamp_seconds,
            duration_seconds,
            byte_length: payload.len(),
            payload,
        }
    }
}

/// Read the next packet, treating a clean end of file as "end of stream".
///
/// Other I/O errors (including HTTP failures surfacing through the byte source) are real
/// errors and are surfaced with context.
fn next_packet(format: &mut dyn FormatReader) -> Result<Option<::symphonia::core::formats::Packet>> {
    match format.next_packet() {
        Ok(p) => Ok(Some(p)),
        Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(SymphoniaError::ResetRequired) => bail!("stream layout changed mid-pass"),
        Err(e) => Err(anyhow!(e)).context("failed reading packet"),
    }
}

fn describe_track(index: usize, track: &Track) -> StreamDescriptor {
    let params = &track.codec_params;

    // Same notion of "audio" as track selection: a known codec with a known sample rate.
    let media_kind = if params.codec != CODEC_TYPE_NULL && params.sample_rate.is_some() {
        MediaKind::Audio
    } else {
        MediaKind::Other
    };

    let mime_type = match media_kind {
        MediaKind::Audio => mime_type_for_codec(params.codec),
        _ => FALLBACK_MIME_TYPE,
    };

    let start_seconds = params.time_base.map(|tb| seconds(tb, params.start_ts));
    let duration_seconds = params
        .time_base
        .zip(params.n_frames)
        .map(|(tb, frames)| seconds(tb, frames));

    StreamDescriptor {
        index,
        media_kind,
        codec_name: codec_name(params.codec),
        mime_type: mime_type.to_owned(),
        channels: params.channels.map(|c| c.count()),
        sample_rate: params.sample_rate,
        start_seconds,
        duration_seconds,
        frames: params.n_frames,
        bits_per_sample: params.bits_per_sample,
        sample_format: params
            .sample_format
            .map(|f| format!("{f:?}").to_ascii_lowercase()),
        extradata: params
            .extra_data
            .as_deref()
            .map_or_else(Bytes::new, Bytes::copy_from_slice),
    }
}

fn collect_tags(revision: Option<&MetadataRevision>, into: &mut BTreeMap<String, String>) {
    let Some(revision) = revision else {
        return;
    };
    for tag in revision.tags() {
        into.insert(tag.key.clone(), tag.value.to_string());
    }
}

fn codec_name(codec: CodecType) -> String {
    if let Some(desc) = ::symphonia::default::get_codecs().get_codec(codec) {
        return desc.short_name.to_owned();
    }
    // Codecs Symphonia can identify but not decode are not in the registry.
    let name = match codec {
        CODEC_TYPE_OPUS => "opus",
        CODEC_TYPE_EAC3 => "eac3",
        CODEC_TYPE_AC3 => "ac3",
        _ => "unknown",
    };
    name.to_owned()
}

pub(crate) fn mime_type_for_codec(codec: CodecType) -> &'static str {
    match codec {
        CODEC_TYPE_MP3 => "audio/mpeg",
        CODEC_TYPE_AAC => "audio/aac",
        CODEC_TYPE_AC3 => "audio/ac3",
        CODEC_TYPE_EAC3 => "audio/eac3",
        CODEC_TYPE_FLAC => "audio/flac",
        CODEC_TYPE_VORBIS => "audio/vorbis",
        CODEC_TYPE_OPUS => "audio/opus",
        CODEC_TYPE_PCM_S16LE
        | CODEC_TYPE_PCM_S16BE
        | CODEC_TYPE_PCM_U16LE
        | CODEC_TYPE_PCM_U16BE
        | CODEC_TYPE_PCM_ALAW
        | CODEC_TYPE_PCM_MULAW => "audio/wav",
        _ => FALLBACK_MIME_TYPE,
    }
}

fn stream_buffer_len(requested: usize) -> usize {
    requested.max(MIN_STREAM_BUFFER_LEN).next_power_of_two()
}

fn seconds(time_base: TimeBase, ts: u64) -> f64 {
    let time = time_base.calc_time(ts);
    time.seconds as f64 + time.frac
}
