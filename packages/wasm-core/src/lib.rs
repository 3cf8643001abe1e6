use std::str::FromStr;

use isomux_common::{
    ChunkId, ChunkMetadata, EncodedFrame, FrameType, ReadFlags, TrackMetadata, TrackSet,
    WriteFlags,
};
use wasm_bindgen::prelude::*;

pub mod avc;
pub mod boxes;
mod config;
mod control;
mod error;
mod fragment;
mod writer;

pub use config::{ContainerBrand, WriterConfig, FRAG_DURATION_US};
pub use control::{ContainerControl, ControlError, Fragments, IsoControl};
pub use error::{BoxStage, MuxError, MuxResult};
pub use fragment::FragmentBuffer;
pub use writer::{ContainerData, IsoMediaWriter, WriteStatus};

/// Initialize the WASM module
/// This function should be called when the WASM module is first loaded
#[wasm_bindgen(start)]
pub fn init() {
    // WASM module initialized
}

/// Log a message to the browser console
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&message.into());
}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// ===== Muxer WASM Bindings =====

/// WASM wrapper for IsoMediaWriter
#[wasm_bindgen]
pub struct Muxer {
    writer: IsoMediaWriter,
    next_chunk_id: ChunkId,
    /// Metadata of the buffers handed out by the last read
    last_chunks: Vec<ChunkMetadata>,
}

#[wasm_bindgen]
impl Muxer {
    /// Create a muxer for the tracks in `track_bits` (1 = audio, 2 = video)
    #[wasm_bindgen(constructor)]
    pub fn new(track_bits: u32, config_json: Option<String>) -> Result<Muxer, String> {
        let config = match config_json {
            Some(json) => WriterConfig::from_json(&json).map_err(|e| e.to_string())?,
            None => WriterConfig::default(),
        };
        let writer = IsoMediaWriter::new(TrackSet::from_bits(track_bits), config)
            .map_err(|e| e.to_string())?;

        Ok(Self {
            writer,
            next_chunk_id: ChunkId::default(),
            last_chunks: Vec::new(),
        })
    }

    /// Configure a track from its JSON metadata, e.g. `{"kind":"amr"}`
    #[wasm_bindgen]
    pub fn set_metadata(&mut self, metadata_json: &str) -> Result<(), String> {
        let metadata = TrackMetadata::from_json(metadata_json).map_err(|e| e.to_string())?;
        self.writer.set_metadata(metadata).map_err(|e| e.to_string())
    }

    /// Push one encoded frame; returns the write status name
    #[wasm_bindgen]
    pub fn write_frame(
        &mut self,
        frame_type: &str,
        timestamp_us: f64,
        duration_us: f64,
        data: &[u8],
        end_of_stream: bool,
    ) -> Result<String, String> {
        let frame_type = FrameType::from_str(frame_type).map_err(|e| e.to_string())?;
        // Timestamps arrive in microseconds (WebCodecs)
        let frame = EncodedFrame::new(frame_type, timestamp_us as u64, data.to_vec())
            .with_duration(duration_us as u64);
        let flags = WriteFlags { end_of_stream };

        let status = self
            .writer
            .write_encoded_track(vec![frame], flags)
            .map_err(|e| e.to_string())?;
        Ok(status.to_string())
    }

    /// Signal end of stream on every configured track
    #[wasm_bindgen]
    pub fn end_of_stream(&mut self) -> Result<String, String> {
        let status = self
            .writer
            .write_encoded_track(Vec::new(), WriteFlags::END_OF_STREAM)
            .map_err(|e| e.to_string())?;
        Ok(status.to_string())
    }

    /// Drain the buffers produced since the last call, as Uint8Arrays
    #[wasm_bindgen]
    pub fn get_container_data(&mut self, flush: bool) -> js_sys::Array {
        let array = js_sys::Array::new();
        for buf in self.drain(flush) {
            array.push(&js_sys::Uint8Array::from(buf.as_slice()));
        }
        array
    }

    /// Chunk metadata (id, kind, size, blake3 hash) of the last drained buffers
    #[wasm_bindgen]
    pub fn chunk_metadata_json(&self) -> Result<String, String> {
        serde_json::to_string(&self.last_chunks).map_err(|e| e.to_string())
    }

    #[wasm_bindgen]
    pub fn is_writing_complete(&self) -> bool {
        self.writer.is_writing_complete()
    }

    #[wasm_bindgen]
    pub fn state(&self) -> String {
        self.writer.state().to_string()
    }
}

impl Muxer {
    fn drain(&mut self, flush: bool) -> Vec<Vec<u8>> {
        let flags = ReadFlags {
            flush_needed: flush,
        };
        let data = self.writer.get_container_data(flags);

        self.last_chunks = data
            .buffers
            .iter()
            .map(|buf| {
                let chunk = ChunkMetadata::describe(self.next_chunk_id, buf);
                self.next_chunk_id = self.next_chunk_id.next();
                chunk
            })
            .collect();

        data.buffers
    }
}
