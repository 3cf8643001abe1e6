use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an output chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl ChunkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an output chunk contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// ftyp + moov
    Init,
    /// moof + mdat
    Fragment,
}

/// Metadata for a single drained output buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Unique chunk identifier
    pub chunk_id: ChunkId,

    pub kind: ChunkKind,

    /// Size of the chunk in bytes
    pub size: usize,

    /// BLAKE3 hash of the chunk data
    pub hash: String,
}

impl ChunkMetadata {
    /// Describe a muxer output buffer
    pub fn describe(chunk_id: ChunkId, data: &[u8]) -> Self {
        let kind = if data.get(4..8) == Some(b"ftyp".as_slice()) {
            ChunkKind::Init
        } else {
            ChunkKind::Fragment
        };

        Self {
            chunk_id,
            kind,
            size: data.len(),
            hash: blake3::hash(data).to_hex().to_string(),
        }
    }

    /// Check that `data` is the chunk this metadata describes
    pub fn verify(&self, data: &[u8]) -> bool {
        self.size == data.len() && blake3::hash(data).to_hex().as_str() == self.hash
    }
}
