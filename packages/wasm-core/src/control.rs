//! Container box generation behind the writer.
//!
//! The writer decides *when* boxes are generated; a [`ContainerControl`]
//! decides *how* buffered frames become bytes.

use isomux_common::{EncodedFrame, MetadataKind, TrackKind, TrackMetadata, TrackSet};
use thiserror::Error;

use crate::avc;
use crate::boxes::{self, RunSample, TrackHeader, TrackRun};
use crate::config::WriterConfig;
use crate::fragment::FragmentBuffer;

/// Errors reported by a container implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("No metadata for {0} track")]
    MissingMetadata(TrackKind),

    #[error("No codec config for {0} track")]
    MissingCodecConfig(TrackKind),

    #[error("Invalid codec config: {0}")]
    InvalidCodecConfig(String),

    #[error("Box too large: {0}")]
    BoxTooLarge(&'static str),
}

/// The writer's fragment buffers, lent to the container for one call
#[derive(Debug, Default)]
pub struct Fragments<'a> {
    pub audio: Option<&'a mut FragmentBuffer>,
    pub video: Option<&'a mut FragmentBuffer>,
}

impl Fragments<'_> {
    pub fn get(&self, kind: TrackKind) -> Option<&FragmentBuffer> {
        match kind {
            TrackKind::Audio => self.audio.as_deref(),
            TrackKind::Video => self.video.as_deref(),
        }
    }

    pub fn get_mut(&mut self, kind: TrackKind) -> Option<&mut FragmentBuffer> {
        match kind {
            TrackKind::Audio => self.audio.as_deref_mut(),
            TrackKind::Video => self.video.as_deref_mut(),
        }
    }
}

/// Box serialization capability used by the writer
pub trait ContainerControl {
    /// Record codec metadata for one track
    fn set_metadata(&mut self, metadata: &TrackMetadata) -> Result<(), ControlError>;

    fn generate_ftyp(&mut self) -> Result<(), ControlError>;

    /// Generate the moov from the recorded metadata and each buffer's codec config
    fn generate_moov(&mut self, fragments: Fragments<'_>) -> Result<(), ControlError>;

    /// Drain one fragment from each buffer of `tracks` into a moof + mdat
    fn generate_moof(
        &mut self,
        tracks: TrackSet,
        fragments: Fragments<'_>,
    ) -> Result<(), ControlError>;

    /// Take the output buffers published since the last call, in order
    fn take_bufs(&mut self) -> Vec<Vec<u8>>;
}

/// ISO-BMFF implementation producing fragmented MP4 or 3GP
#[derive(Debug)]
pub struct IsoControl {
    config: WriterConfig,
    audio: Option<TrackMetadata>,
    video: Option<TrackMetadata>,
    /// Bytes of a buffer still being assembled (ftyp until moov follows)
    staged: Vec<u8>,
    bufs: Vec<Vec<u8>>,
    sequence_number: u32,
    /// Timestamp mapped to decode time zero for every track
    origin_us: Option<u64>,
}

impl IsoControl {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            audio: None,
            video: None,
            staged: Vec::new(),
            bufs: Vec::new(),
            sequence_number: 1,
            origin_us: None,
        }
    }

    /// Sequence number the next moof will carry
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    fn metadata(&self, kind: TrackKind) -> Option<&TrackMetadata> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    /// Video is track 1 when present, audio follows
    fn track_id(&self, kind: TrackKind) -> u32 {
        match kind {
            TrackKind::Video => 1,
            TrackKind::Audio => {
                if self.video.is_some() {
                    2
                } else {
                    1
                }
            }
        }
    }

    fn timescale(&self, metadata: &TrackMetadata) -> u32 {
        match metadata.kind().track_kind() {
            TrackKind::Video => self.config.video_timescale,
            TrackKind::Audio => metadata.sample_rate().unwrap_or(self.config.movie_timescale),
        }
    }

    /// Duration in timescale units used when no timestamp delta is known
    fn default_sample_duration(&self, metadata: &TrackMetadata) -> u32 {
        match metadata {
            TrackMetadata::Avc { frame_rate, .. } => {
                self.config.video_timescale / (*frame_rate).max(1)
            }
            TrackMetadata::Aac { .. } => 1024,
            // 20ms speech frames
            _ => self.timescale(metadata) / 50,
        }
    }

    fn track_header(
        &self,
        metadata: &TrackMetadata,
        buffer: Option<&FragmentBuffer>,
    ) -> Result<TrackHeader, ControlError> {
        let kind = metadata.kind().track_kind();
        let csd = buffer.and_then(FragmentBuffer::csd).map(|f| f.payload.as_slice());

        let (width, height, sample_entry) = match metadata {
            TrackMetadata::Avc { width, height, .. } => {
                let csd = csd.ok_or(ControlError::MissingCodecConfig(kind))?;
                let record = avc::decoder_config_record(csd)?;
                (*width, *height, boxes::build_avc1(*width, *height, &record))
            }
            TrackMetadata::Aac {
                sample_rate,
                channels,
                bitrate,
            } => (
                0,
                0,
                boxes::build_mp4a(*sample_rate, *channels, *bitrate, csd.unwrap_or_default()),
            ),
            TrackMetadata::Amr { channels } => (0, 0, boxes::build_amr_entry(false, *channels)),
            TrackMetadata::AmrWb { channels } => (0, 0, boxes::build_amr_entry(true, *channels)),
            TrackMetadata::Evrc { channels } => (0, 0, boxes::build_evrc_entry(*channels)),
            TrackMetadata::Opus { .. } | TrackMetadata::Vp8 { .. } => {
                return Err(ControlError::InvalidCodecConfig(format!(
                    "{} cannot be stored in ISO-BMFF",
                    metadata.kind()
                )));
            }
        };

        Ok(TrackHeader {
            track_id: self.track_id(kind),
            kind,
            timescale: self.timescale(metadata),
            width,
            height,
            sample_entry,
        })
    }

    fn track_run(
        &self,
        kind: TrackKind,
        frames: Vec<EncodedFrame>,
        next_timestamp_us: Option<u64>,
        origin_us: u64,
    ) -> Result<TrackRun, ControlError> {
        let metadata = self
            .metadata(kind)
            .ok_or(ControlError::MissingMetadata(kind))?;
        let timescale = self.timescale(metadata);
        let default_duration = self.default_sample_duration(metadata);
        let to_units = |ts: u64| scale_us(ts.saturating_sub(origin_us), timescale);

        let base_media_decode_time = frames
            .first()
            .map_or(0, |f| to_units(f.timestamp_us));

        let mut samples: Vec<RunSample> = Vec::with_capacity(frames.len());
        let mut previous_duration = None;
        for (i, frame) in frames.iter().enumerate() {
            let next = frames
                .get(i + 1)
                .map(|f| f.timestamp_us)
                .or(next_timestamp_us);

            // Deltas of scaled absolute times keep rounding from accumulating
            let duration = match next {
                Some(next) if next > frame.timestamp_us => {
                    to_units(next).saturating_sub(to_units(frame.timestamp_us))
                }
                _ if frame.duration_us > 0 => scale_us(frame.duration_us, timescale),
                _ => previous_duration.unwrap_or(u64::from(default_duration)),
            };
            previous_duration = Some(duration);

            let flags = if frame.frame_type.is_sync() {
                boxes::SYNC_SAMPLE_FLAGS
            } else {
                boxes::NON_SYNC_SAMPLE_FLAGS
            };

            samples.push(RunSample {
                duration: u32::try_from(duration).map_err(|_| ControlError::BoxTooLarge("trun"))?,
                data: Vec::new(),
                flags,
            });
        }

        for (sample, frame) in samples.iter_mut().zip(frames) {
            sample.data = if kind == TrackKind::Video && avc::is_annex_b(&frame.payload) {
                avc::annex_b_to_avcc(&frame.payload)
            } else {
                frame.payload
            };
        }

        Ok(TrackRun {
            track_id: self.track_id(kind),
            base_media_decode_time,
            samples,
            with_sample_flags: kind == TrackKind::Video,
        })
    }
}

/// Convert microseconds to `timescale` units
fn scale_us(us: u64, timescale: u32) -> u64 {
    (u128::from(us) * u128::from(timescale) / 1_000_000) as u64
}

impl ContainerControl for IsoControl {
    fn set_metadata(&mut self, metadata: &TrackMetadata) -> Result<(), ControlError> {
        if matches!(metadata.kind(), MetadataKind::Opus | MetadataKind::Vp8) {
            return Err(ControlError::InvalidCodecConfig(format!(
                "{} cannot be stored in ISO-BMFF",
                metadata.kind()
            )));
        }

        if let TrackMetadata::Avc { width, height, .. } = metadata {
            if *width > boxes::MAX_DIMENSION || *height > boxes::MAX_DIMENSION {
                return Err(ControlError::InvalidCodecConfig(format!(
                    "video size {width}x{height} exceeds {}",
                    boxes::MAX_DIMENSION
                )));
            }
        }

        match metadata.kind().track_kind() {
            TrackKind::Audio => self.audio = Some(metadata.clone()),
            TrackKind::Video => self.video = Some(metadata.clone()),
        }
        Ok(())
    }

    fn generate_ftyp(&mut self) -> Result<(), ControlError> {
        self.staged = boxes::build_ftyp(self.config.brand);
        Ok(())
    }

    fn generate_moov(&mut self, fragments: Fragments<'_>) -> Result<(), ControlError> {
        let mut tracks = Vec::with_capacity(2);
        for kind in [TrackKind::Video, TrackKind::Audio] {
            if let Some(metadata) = self.metadata(kind) {
                tracks.push(self.track_header(metadata, fragments.get(kind))?);
            }
        }
        if tracks.is_empty() {
            return Err(ControlError::MissingMetadata(TrackKind::Audio));
        }

        let moov = boxes::build_moov(self.config.movie_timescale, &tracks);
        let mut init = std::mem::take(&mut self.staged);
        init.extend_from_slice(&moov);

        tracing::debug!(
            tracks = tracks.len(),
            size = init.len(),
            "Generated init segment"
        );
        self.bufs.push(init);
        Ok(())
    }

    fn generate_moof(
        &mut self,
        tracks: TrackSet,
        mut fragments: Fragments<'_>,
    ) -> Result<(), ControlError> {
        let mut drained = Vec::with_capacity(2);
        for kind in [TrackKind::Video, TrackKind::Audio] {
            if !tracks.contains(kind) {
                continue;
            }
            let Some(buffer) = fragments.get_mut(kind) else {
                continue;
            };
            let frames = buffer.take_fragment();
            if frames.is_empty() {
                continue;
            }
            let next_timestamp_us = buffer.frames().first().map(|f| f.timestamp_us);
            drained.push((kind, frames, next_timestamp_us));
        }

        if drained.is_empty() {
            return Ok(());
        }

        let origin_us = match self.origin_us {
            Some(origin) => origin,
            None => {
                let origin = drained
                    .iter()
                    .filter_map(|(_, frames, _)| frames.first().map(|f| f.timestamp_us))
                    .min()
                    .unwrap_or(0);
                self.origin_us = Some(origin);
                origin
            }
        };

        let mut runs = Vec::with_capacity(drained.len());
        for (kind, frames, next_timestamp_us) in drained {
            runs.push(self.track_run(kind, frames, next_timestamp_us, origin_us)?);
        }

        let segment = boxes::build_media_segment(self.sequence_number, &runs)?;
        tracing::debug!(
            sequence_number = self.sequence_number,
            samples = runs.iter().map(|r| r.samples.len()).sum::<usize>(),
            size = segment.len(),
            "Generated media segment"
        );
        self.sequence_number += 1;
        self.bufs.push(segment);
        Ok(())
    }

    fn take_bufs(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.bufs)
    }
}
