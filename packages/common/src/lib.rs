pub mod chunk;
pub mod frame;
pub mod metadata;
pub mod session;

pub use chunk::{ChunkId, ChunkKind, ChunkMetadata};
pub use frame::{
    EncodedFrame, FrameType, ReadFlags, TrackKind, TrackSet, UnknownFrameType, WriteFlags,
};
pub use metadata::{MetadataKind, TrackMetadata};
pub use session::{MuxerState, SessionId};
