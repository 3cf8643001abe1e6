use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Set of tracks a writer is created with
///
/// Fixed for the lifetime of a writer; decides which readiness rules apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackSet {
    pub audio: bool,
    pub video: bool,
}

impl TrackSet {
    /// Bit requesting an audio track
    pub const CREATE_AUDIO_TRACK: u32 = 1 << 0;
    /// Bit requesting a video track
    pub const CREATE_VIDEO_TRACK: u32 = 1 << 1;

    pub const AUDIO: TrackSet = TrackSet {
        audio: true,
        video: false,
    };
    pub const VIDEO: TrackSet = TrackSet {
        audio: false,
        video: true,
    };
    pub const AUDIO_VIDEO: TrackSet = TrackSet {
        audio: true,
        video: true,
    };

    /// Build from a `CREATE_*_TRACK` bitmask. Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            audio: bits & Self::CREATE_AUDIO_TRACK != 0,
            video: bits & Self::CREATE_VIDEO_TRACK != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.audio {
            bits |= Self::CREATE_AUDIO_TRACK;
        }
        if self.video {
            bits |= Self::CREATE_VIDEO_TRACK;
        }
        bits
    }

    pub fn contains(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Video => self.video,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// Codec and role of an encoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameType {
    AacAudioFrame,
    AacCsd,
    AmrAudioFrame,
    AmrCsd,
    EvrcAudioFrame,
    EvrcCsd,
    AvcIFrame,
    AvcPFrame,
    AvcBFrame,
    AvcCsd,
    // Produced for the WebM/Ogg writers; not muxable into ISO-BMFF.
    OpusAudioFrame,
    Vp8IFrame,
    Vp8PFrame,
}

impl FrameType {
    /// Track this frame belongs to, or `None` if the ISO writer cannot carry it
    pub fn track_kind(&self) -> Option<TrackKind> {
        match self {
            FrameType::AacAudioFrame
            | FrameType::AacCsd
            | FrameType::AmrAudioFrame
            | FrameType::AmrCsd
            | FrameType::EvrcAudioFrame
            | FrameType::EvrcCsd => Some(TrackKind::Audio),
            FrameType::AvcIFrame
            | FrameType::AvcPFrame
            | FrameType::AvcBFrame
            | FrameType::AvcCsd => Some(TrackKind::Video),
            FrameType::OpusAudioFrame | FrameType::Vp8IFrame | FrameType::Vp8PFrame => None,
        }
    }

    /// Whether this frame carries codec specific data rather than a sample
    pub fn is_csd(&self) -> bool {
        matches!(
            self,
            FrameType::AacCsd | FrameType::AmrCsd | FrameType::EvrcCsd | FrameType::AvcCsd
        )
    }

    /// Whether a sample of this type can be decoded on its own
    pub fn is_sync(&self) -> bool {
        match self {
            FrameType::AvcIFrame | FrameType::Vp8IFrame => true,
            FrameType::AvcPFrame | FrameType::AvcBFrame | FrameType::Vp8PFrame => false,
            _ => !self.is_csd(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::AacAudioFrame => "aac-audio-frame",
            FrameType::AacCsd => "aac-csd",
            FrameType::AmrAudioFrame => "amr-audio-frame",
            FrameType::AmrCsd => "amr-csd",
            FrameType::EvrcAudioFrame => "evrc-audio-frame",
            FrameType::EvrcCsd => "evrc-csd",
            FrameType::AvcIFrame => "avc-i-frame",
            FrameType::AvcPFrame => "avc-p-frame",
            FrameType::AvcBFrame => "avc-b-frame",
            FrameType::AvcCsd => "avc-csd",
            FrameType::OpusAudioFrame => "opus-audio-frame",
            FrameType::Vp8IFrame => "vp8-i-frame",
            FrameType::Vp8PFrame => "vp8-p-frame",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a frame type name is not recognized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown frame type: {0}")]
pub struct UnknownFrameType(pub String);

impl FromStr for FrameType {
    type Err = UnknownFrameType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let frame_type = match s {
            "aac-audio-frame" => FrameType::AacAudioFrame,
            "aac-csd" => FrameType::AacCsd,
            "amr-audio-frame" => FrameType::AmrAudioFrame,
            "amr-csd" => FrameType::AmrCsd,
            "evrc-audio-frame" => FrameType::EvrcAudioFrame,
            "evrc-csd" => FrameType::EvrcCsd,
            "avc-i-frame" => FrameType::AvcIFrame,
            "avc-p-frame" => FrameType::AvcPFrame,
            "avc-b-frame" => FrameType::AvcBFrame,
            "avc-csd" => FrameType::AvcCsd,
            "opus-audio-frame" => FrameType::OpusAudioFrame,
            "vp8-i-frame" => FrameType::Vp8IFrame,
            "vp8-p-frame" => FrameType::Vp8PFrame,
            other => return Err(UnknownFrameType(other.to_string())),
        };
        Ok(frame_type)
    }
}

/// One encoded access unit handed over by the encoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFrame {
    pub frame_type: FrameType,

    /// Presentation timestamp in microseconds
    pub timestamp_us: u64,

    /// Duration in microseconds (0 = unknown)
    pub duration_us: u64,

    /// Encoded bytes
    pub payload: Vec<u8>,
}

impl EncodedFrame {
    pub fn new(frame_type: FrameType, timestamp_us: u64, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            timestamp_us,
            duration_us: 0,
            payload,
        }
    }

    pub fn with_duration(mut self, duration_us: u64) -> Self {
        self.duration_us = duration_us;
        self
    }

    pub fn track_kind(&self) -> Option<TrackKind> {
        self.frame_type.track_kind()
    }
}

/// Flags accepted by `write_encoded_track`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteFlags {
    pub end_of_stream: bool,
}

impl WriteFlags {
    pub const NONE: WriteFlags = WriteFlags {
        end_of_stream: false,
    };
    pub const END_OF_STREAM: WriteFlags = WriteFlags {
        end_of_stream: true,
    };
}

/// Flags accepted by `get_container_data`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadFlags {
    pub flush_needed: bool,
}

impl ReadFlags {
    pub const NONE: ReadFlags = ReadFlags {
        flush_needed: false,
    };
    pub const FLUSH_NEEDED: ReadFlags = ReadFlags { flush_needed: true };
}
