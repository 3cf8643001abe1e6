use serde::{Deserialize, Serialize};

use crate::error::{MuxError, MuxResult};

/// Default fragment duration: 2 seconds
pub const FRAG_DURATION_US: u64 = 2_000_000;

/// File type family written into ftyp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerBrand {
    /// Fragmented MP4 (iso5)
    #[default]
    Mp4,
    /// Fragmented 3GP (3gp9)
    #[serde(rename = "3gp")]
    ThreeGp,
}

impl ContainerBrand {
    pub fn major_brand(&self) -> &'static [u8; 4] {
        match self {
            ContainerBrand::Mp4 => b"iso5",
            ContainerBrand::ThreeGp => b"3gp9",
        }
    }

    pub fn compatible_brands(&self) -> &'static [&'static [u8; 4]] {
        match self {
            ContainerBrand::Mp4 => &[b"iso5", b"iso6", b"mp41"],
            ContainerBrand::ThreeGp => &[b"3gp9", b"isom"],
        }
    }
}

/// Configuration for the writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Buffered duration per track that triggers a fragment
    pub fragment_duration_us: u64,
    pub brand: ContainerBrand,
    pub video_timescale: u32,
    pub movie_timescale: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            fragment_duration_us: FRAG_DURATION_US,
            brand: ContainerBrand::Mp4,
            video_timescale: 90000, // Standard video timescale
            movie_timescale: 1000,
        }
    }
}

impl WriterConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> MuxResult<Self> {
        let config: WriterConfig =
            serde_json::from_str(json).map_err(|e| MuxError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MuxResult<()> {
        if self.fragment_duration_us == 0 {
            return Err(MuxError::InvalidConfig(
                "fragment_duration_us must be positive".to_string(),
            ));
        }
        if self.video_timescale == 0 || self.movie_timescale == 0 {
            return Err(MuxError::InvalidConfig(
                "timescales must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
