// src/media.rs

//! Values exchanged with the demux engine: packets and the stream descriptors of an opened
//! source.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

/// MIME type reported when no stream of the wanted kind is found.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

/// How an engine should land on a timestamp it cannot hit exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekDirection {
    /// Nearest preceding packet/keyframe. Point queries rely on this.
    #[default]
    Backward,
    /// Whatever position the container can reach cheaply.
    Nearest,
}

/// One compressed, timestamped unit of media data.
///
/// Immutable once produced; the consumer owns `payload` after delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    pub stream_index: usize,
    pub codec_name: String,
    pub is_keyframe: bool,
    pub timestamp_seconds: f64,
    pub duration_seconds: f64,
    pub byte_length: usize,
    #[serde(skip)]
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescriptor {
    pub index: usize,
    pub media_kind: MediaKind,
    pub codec_name: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Frames in the stream (samples per channel for audio), when the container says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u32>,
    /// Lowercase sample layout such as `s16` or `f32`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_format: Option<String>,
    /// Codec-private setup data (decoder configuration records and the like). Empty when the
    /// codec has none. Not serialized.
    #[serde(skip)]
    pub extradata: Bytes,
}

/// Snapshot of the streams in an opened source, in container order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MediaInfo {
    pub streams: Vec<StreamDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Earliest stream start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<f64>,
    /// Container tags (title, artist, ...), keyed by the container's own tag names.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl MediaInfo {
    /// First stream of the given kind.
    pub fn first_of_kind(&self, kind: MediaKind) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.media_kind == kind)
    }

    /// MIME type of the first stream of `kind`, or [`FALLBACK_MIME_TYPE`].
    pub fn mime_type_for(&self, kind: MediaKind) -> &str {
        self.first_of_kind(kind)
            .map_or(FALLBACK_MIME_TYPE, |s| s.mime_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, kind: MediaKind, mime: &str) -> StreamDescriptor {
        StreamDescriptor {
            index,
            media_kind: kind,
            codec_name: "x".into(),
            mime_type: mime.into(),
            channels: None,
            sample_rate: None,
            start_seconds: None,
            duration_seconds: None,
            frames: None,
            bits_per_sample: None,
            sample_format: None,
            extradata: Bytes::new(),
        }
    }

    #[test]
    fn mime_type_comes_from_first_matching_stream() {
        let info = MediaInfo {
            streams: vec![
                stream(0, MediaKind::Video, "video/mp4"),
                stream(1, MediaKind::Audio, "audio/aac"),
                stream(2, MediaKind::Audio, "audio/mpeg"),
            ],
            ..MediaInfo::default()
        };
        assert_eq!(info.mime_type_for(MediaKind::Audio), "audio/aac");
        assert_eq!(info.mime_type_for(MediaKind::Other), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn descriptors_serialize_without_absent_fields_or_extradata() {
        let mut audio = stream(0, MediaKind::Audio, "audio/aac");
        audio.sample_format = Some("f32".into());
        audio.extradata = Bytes::from_static(&[0x12, 0x10]);
        let mut info = MediaInfo {
            streams: vec![audio],
            ..MediaInfo::default()
        };

        let json = serde_json::to_value(&info).unwrap();
        let stream = &json["streams"][0];
        assert_eq!(stream["sample_format"], "f32");
        assert!(stream.get("extradata").is_none());
        assert!(stream.get("frames").is_none());
        assert!(json.get("tags").is_none());

        info.tags.insert("TITLE".into(), "Intro".into());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tags"]["TITLE"], "Intro");
    }

    #[test]
    fn media_kind_serializes_lowercase() {
        let json = serde_json::to_string(&MediaKind::Audio).unwrap();
        assert_eq!(json, "\"audio\"");
    }
}
