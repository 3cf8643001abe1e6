use crate::frame::TrackKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Codec metadata for one track, as reported by the track encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TrackMetadata {
    Aac {
        /// Sample rate in Hz
        sample_rate: u32,
        channels: u16,
        /// Average bitrate in bits per second
        #[serde(default)]
        bitrate: u32,
    },
    Amr {
        #[serde(default = "default_channels")]
        channels: u16,
    },
    AmrWb {
        #[serde(default = "default_channels")]
        channels: u16,
    },
    Evrc {
        #[serde(default = "default_channels")]
        channels: u16,
    },
    Avc {
        /// Video width in pixels
        width: u32,
        /// Video height in pixels
        height: u32,
        /// Frame rate (frames per second)
        #[serde(default = "default_frame_rate")]
        frame_rate: u32,
    },
    Opus {
        sample_rate: u32,
        channels: u16,
    },
    Vp8 {
        width: u32,
        height: u32,
    },
}

fn default_channels() -> u16 {
    1
}

fn default_frame_rate() -> u32 {
    30
}

impl TrackMetadata {
    pub fn kind(&self) -> MetadataKind {
        match self {
            TrackMetadata::Aac { .. } => MetadataKind::Aac,
            TrackMetadata::Amr { .. } => MetadataKind::Amr,
            TrackMetadata::AmrWb { .. } => MetadataKind::AmrWb,
            TrackMetadata::Evrc { .. } => MetadataKind::Evrc,
            TrackMetadata::Avc { .. } => MetadataKind::Avc,
            TrackMetadata::Opus { .. } => MetadataKind::Opus,
            TrackMetadata::Vp8 { .. } => MetadataKind::Vp8,
        }
    }

    /// Sample rate of an audio track; the codec's fixed rate for AMR/EVRC
    pub fn sample_rate(&self) -> Option<u32> {
        match self {
            TrackMetadata::Aac { sample_rate, .. } | TrackMetadata::Opus { sample_rate, .. } => {
                Some(*sample_rate)
            }
            TrackMetadata::Amr { .. } | TrackMetadata::Evrc { .. } => Some(8000),
            TrackMetadata::AmrWb { .. } => Some(16000),
            TrackMetadata::Avc { .. } | TrackMetadata::Vp8 { .. } => None,
        }
    }

    pub fn channels(&self) -> Option<u16> {
        match self {
            TrackMetadata::Aac { channels, .. }
            | TrackMetadata::Amr { channels }
            | TrackMetadata::AmrWb { channels }
            | TrackMetadata::Evrc { channels }
            | TrackMetadata::Opus { channels, .. } => Some(*channels),
            TrackMetadata::Avc { .. } | TrackMetadata::Vp8 { .. } => None,
        }
    }

    /// Parse metadata from the JSON shape used at the JS boundary
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Discriminant of `TrackMetadata`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataKind {
    Aac,
    Amr,
    AmrWb,
    Evrc,
    Avc,
    Opus,
    Vp8,
}

impl MetadataKind {
    pub fn track_kind(&self) -> TrackKind {
        match self {
            MetadataKind::Aac
            | MetadataKind::Amr
            | MetadataKind::AmrWb
            | MetadataKind::Evrc
            | MetadataKind::Opus => TrackKind::Audio,
            MetadataKind::Avc | MetadataKind::Vp8 => TrackKind::Video,
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataKind::Aac => write!(f, "aac"),
            MetadataKind::Amr => write!(f, "amr"),
            MetadataKind::AmrWb => write!(f, "amr-wb"),
            MetadataKind::Evrc => write!(f, "evrc"),
            MetadataKind::Avc => write!(f, "avc"),
            MetadataKind::Opus => write!(f, "opus"),
            MetadataKind::Vp8 => write!(f, "vp8"),
        }
    }
}
