//! Muxer error types.

use isomux_common::{FrameType, MetadataKind, MuxerState, TrackKind};
use std::fmt;
use thiserror::Error;

use crate::control::ControlError;

/// Box generation step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxStage {
    Ftyp,
    Moov,
    Moof,
}

impl fmt::Display for BoxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxStage::Ftyp => write!(f, "ftyp"),
            BoxStage::Moov => write!(f, "moov"),
            BoxStage::Moof => write!(f, "moof"),
        }
    }
}

/// Errors that can occur during fragmented MP4 muxing.
#[derive(Error, Debug)]
pub enum MuxError {
    /// Metadata kind the ISO writer cannot carry.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(MetadataKind),

    /// No track was declared or configured before writing.
    #[error("Muxer not configured")]
    NotConfigured,

    /// Frame type that maps to no configured track.
    #[error("Invalid frame type: {0}")]
    InvalidFrameType(FrameType),

    /// The container collaborator failed to build a box. Fatal for the writer.
    #[error("Container generation failed at {stage}: {source}")]
    ContainerGenerationFailed {
        stage: BoxStage,
        #[source]
        source: ControlError,
    },

    /// Operation not allowed in the current state.
    #[error("Invalid state transition: {operation} while {state}")]
    InvalidStateTransition {
        state: MuxerState,
        operation: &'static str,
    },

    /// Invalid writer configuration.
    #[error("Invalid muxer config: {0}")]
    InvalidConfig(String),

    /// Metadata for a track the writer was not created with.
    #[error("Track not declared: {0}")]
    UndeclaredTrack(TrackKind),

    /// Metadata supplied twice for the same track.
    #[error("Track already configured: {0}")]
    TrackAlreadyConfigured(TrackKind),

    /// Frame pushed to a track after its end of stream.
    #[error("End of stream already reached on {0} track")]
    EndOfStreamReached(TrackKind),

    /// A previous container generation failure left the writer unusable.
    #[error("Muxer poisoned by an earlier container generation failure")]
    Poisoned,
}

/// Convenience Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;
