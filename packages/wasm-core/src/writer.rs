//! Fragmented ISO-BMFF writer state machine.
//!
//! Frames of up to two tracks are buffered per track. Once every declared
//! track has codec config and enough buffered data (or has reached end of
//! stream), the writer asks its [`ContainerControl`] for boxes:
//! ftyp and moov once, then one moof per cycle.

use std::fmt;

use isomux_common::{
    EncodedFrame, MetadataKind, MuxerState, ReadFlags, SessionId, TrackKind, TrackMetadata,
    TrackSet, WriteFlags,
};

use crate::config::WriterConfig;
use crate::control::{ContainerControl, Fragments, IsoControl};
use crate::error::{BoxStage, MuxError, MuxResult};
use crate::fragment::FragmentBuffer;

/// Outcome of a successful `write_encoded_track`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// A declared track has no codec config yet; nothing was muxed
    AwaitingCodecConfig,
    /// Frames buffered, not enough data for a fragment
    Buffering,
    /// At least one state machine cycle ran
    Muxed,
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::AwaitingCodecConfig => "awaiting-codec-config",
            WriteStatus::Buffering => "buffering",
            WriteStatus::Muxed => "muxed",
        }
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output drained by `get_container_data`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerData {
    pub buffers: Vec<Vec<u8>>,
    /// No more output will follow
    pub writing_complete: bool,
}

impl ContainerData {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Fragmented MP4/3GP writer
#[derive(Debug)]
pub struct IsoMediaWriter<C = IsoControl> {
    session_id: SessionId,
    state: MuxerState,
    tracks: TrackSet,
    fragment_duration_us: u64,
    audio: Option<FragmentBuffer>,
    video: Option<FragmentBuffer>,
    control: C,
    /// Set by every state machine cycle, cleared by a read
    output_ready: bool,
    writing_complete: bool,
    /// Set once box generation failed; the writer accepts nothing afterwards
    poisoned: bool,
}

impl IsoMediaWriter<IsoControl> {
    /// Create a writer for `tracks` producing ISO-BMFF boxes
    pub fn new(tracks: TrackSet, config: WriterConfig) -> MuxResult<Self> {
        let control = IsoControl::new(config.clone());
        Self::with_control(tracks, config, control)
    }
}

impl<C: ContainerControl> IsoMediaWriter<C> {
    /// Create a writer around any container implementation
    pub fn with_control(tracks: TrackSet, config: WriterConfig, control: C) -> MuxResult<Self> {
        config.validate()?;

        let session_id = SessionId::new();
        tracing::debug!(%session_id, audio = tracks.audio, video = tracks.video, "Created writer");

        Ok(Self {
            session_id,
            state: MuxerState::Head,
            tracks,
            fragment_duration_us: config.fragment_duration_us,
            audio: None,
            video: None,
            control,
            output_ready: false,
            writing_complete: false,
            poisoned: false,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> MuxerState {
        self.state
    }

    pub fn tracks(&self) -> TrackSet {
        self.tracks
    }

    pub fn is_writing_complete(&self) -> bool {
        self.writing_complete
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    fn buffer(&self, kind: TrackKind) -> Option<&FragmentBuffer> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    fn buffer_mut(&mut self, kind: TrackKind) -> Option<&mut FragmentBuffer> {
        match kind {
            TrackKind::Audio => self.audio.as_mut(),
            TrackKind::Video => self.video.as_mut(),
        }
    }

    fn declared_kinds(&self) -> impl Iterator<Item = TrackKind> {
        let tracks = self.tracks;
        [TrackKind::Audio, TrackKind::Video]
            .into_iter()
            .filter(move |kind| tracks.contains(*kind))
    }

    /// Configure one declared track and allocate its fragment buffer
    pub fn set_metadata(&mut self, metadata: TrackMetadata) -> MuxResult<()> {
        if self.poisoned {
            return Err(MuxError::Poisoned);
        }
        if self.state != MuxerState::Head {
            return Err(MuxError::InvalidStateTransition {
                state: self.state,
                operation: "set_metadata",
            });
        }

        let codec = metadata.kind();
        if matches!(codec, MetadataKind::Opus | MetadataKind::Vp8) {
            return Err(MuxError::UnsupportedCodec(codec));
        }

        let kind = codec.track_kind();
        if !self.tracks.contains(kind) {
            return Err(MuxError::UndeclaredTrack(kind));
        }
        if self.buffer(kind).is_some() {
            return Err(MuxError::TrackAlreadyConfigured(kind));
        }

        self.control
            .set_metadata(&metadata)
            .map_err(|e| MuxError::InvalidConfig(e.to_string()))?;

        let buffer = FragmentBuffer::new(kind, self.fragment_duration_us);
        match kind {
            TrackKind::Audio => self.audio = Some(buffer),
            TrackKind::Video => self.video = Some(buffer),
        }

        tracing::info!(session_id = %self.session_id, track = %kind, codec = %codec, "Configured track");
        Ok(())
    }

    /// Buffer `frames` and mux whatever is ready
    pub fn write_encoded_track(
        &mut self,
        frames: Vec<EncodedFrame>,
        flags: WriteFlags,
    ) -> MuxResult<WriteStatus> {
        if self.poisoned {
            return Err(MuxError::Poisoned);
        }
        if self.state == MuxerState::Done {
            return Err(MuxError::InvalidStateTransition {
                state: self.state,
                operation: "write_encoded_track",
            });
        }
        if frames.is_empty() && !flags.end_of_stream {
            return Ok(WriteStatus::Buffering);
        }
        if self.tracks.is_empty() || (self.audio.is_none() && self.video.is_none()) {
            return Err(MuxError::NotConfigured);
        }

        // Reject the whole batch before buffering any of it
        for frame in &frames {
            self.check_frame(frame)?;
        }

        let mut last_kind = None;
        for frame in frames {
            let frame_type = frame.frame_type;
            let buffer = frame
                .track_kind()
                .and_then(|kind| self.buffer_mut(kind))
                .ok_or(MuxError::InvalidFrameType(frame_type))?;
            last_kind = Some(buffer.kind());
            buffer.add_frame(frame)?;
        }

        if flags.end_of_stream {
            match last_kind {
                Some(kind) => {
                    if let Some(buffer) = self.buffer_mut(kind) {
                        buffer.set_end_of_stream();
                    }
                }
                None => {
                    for buffer in [self.audio.as_mut(), self.video.as_mut()].into_iter().flatten() {
                        buffer.set_end_of_stream();
                    }
                }
            }
        }

        let awaiting = self
            .declared_kinds()
            .any(|kind| !self.buffer(kind).is_some_and(FragmentBuffer::has_csd));
        if awaiting {
            tracing::debug!(session_id = %self.session_id, "Waiting for codec config");
            return Ok(WriteStatus::AwaitingCodecConfig);
        }

        let (ready, eos) = self.readiness();
        if !ready {
            return Ok(WriteStatus::Buffering);
        }

        loop {
            let previous = self.state;
            self.run_state(eos)?;
            if previous == MuxerState::Head {
                continue;
            }
            if !eos || self.state == MuxerState::Done {
                break;
            }
        }

        Ok(WriteStatus::Muxed)
    }

    /// Fail the way `FragmentBuffer::add_frame` would, without adding
    fn check_frame(&self, frame: &EncodedFrame) -> MuxResult<()> {
        let buffer = frame
            .track_kind()
            .and_then(|kind| self.buffer(kind))
            .ok_or(MuxError::InvalidFrameType(frame.frame_type))?;
        if buffer.eos() && !frame.frame_type.is_csd() {
            return Err(MuxError::EndOfStreamReached(buffer.kind()));
        }
        Ok(())
    }

    /// Whether every declared track can contribute a fragment, and whether
    /// every declared track reached end of stream. End of stream forces
    /// readiness so the last partial fragment is drained.
    fn readiness(&self) -> (bool, bool) {
        let mut ready = true;
        let mut eos = true;
        for kind in self.declared_kinds() {
            match self.buffer(kind) {
                Some(buffer) => {
                    ready &= buffer.has_enough_data();
                    eos &= buffer.eos();
                }
                None => return (false, false),
            }
        }
        (ready || eos, eos)
    }

    fn run_state(&mut self, eos: bool) -> MuxResult<()> {
        let result = match self.state {
            MuxerState::Head => self.run_head(),
            MuxerState::Fragmenting => self.run_fragmenting(eos),
            MuxerState::Done => Ok(()),
        };

        if let Err(ref e) = result {
            tracing::error!(session_id = %self.session_id, state = %self.state, error = %e, "Box generation failed");
            self.poisoned = true;
            return result;
        }

        self.output_ready = true;
        Ok(())
    }

    fn run_head(&mut self) -> MuxResult<()> {
        self.control
            .generate_ftyp()
            .map_err(|source| MuxError::ContainerGenerationFailed {
                stage: BoxStage::Ftyp,
                source,
            })?;
        self.control
            .generate_moov(Fragments {
                audio: self.audio.as_mut(),
                video: self.video.as_mut(),
            })
            .map_err(|source| MuxError::ContainerGenerationFailed {
                stage: BoxStage::Moov,
                source,
            })?;

        self.state = MuxerState::Fragmenting;
        tracing::debug!(session_id = %self.session_id, state = %self.state, "State transition");
        Ok(())
    }

    fn run_fragmenting(&mut self, eos: bool) -> MuxResult<()> {
        self.control
            .generate_moof(
                self.tracks,
                Fragments {
                    audio: self.audio.as_mut(),
                    video: self.video.as_mut(),
                },
            )
            .map_err(|source| MuxError::ContainerGenerationFailed {
                stage: BoxStage::Moof,
                source,
            })?;

        if eos {
            self.state = MuxerState::Done;
            tracing::info!(session_id = %self.session_id, "Writing finished");
        }
        Ok(())
    }

    /// Drain the buffers produced since the last read.
    ///
    /// `flush_needed` hands out whatever is staged and marks the writing
    /// complete even before `Done`.
    pub fn get_container_data(&mut self, flags: ReadFlags) -> ContainerData {
        if self.poisoned {
            self.control.take_bufs();
            return ContainerData::default();
        }

        if !self.output_ready && !flags.flush_needed {
            return ContainerData {
                buffers: Vec::new(),
                writing_complete: self.writing_complete,
            };
        }

        if self.state == MuxerState::Done || flags.flush_needed {
            self.writing_complete = true;
        }
        self.output_ready = false;

        ContainerData {
            buffers: self.control.take_bufs(),
            writing_complete: self.writing_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use isomux_common::FrameType;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        SetMetadata(MetadataKind),
        Ftyp,
        Moov,
        Moof(TrackSet),
    }

    /// Records calls and publishes one marker buffer per generated box
    #[derive(Debug, Default)]
    struct ScriptedControl {
        calls: Vec<Call>,
        bufs: Vec<Vec<u8>>,
        fail_on: Option<Call>,
    }

    impl ScriptedControl {
        fn failing_on(call: Call) -> Self {
            Self {
                fail_on: Some(call),
                ..Self::default()
            }
        }

        fn record(&mut self, call: Call) -> Result<(), ControlError> {
            self.calls.push(call);
            if self.fail_on == Some(call) {
                return Err(ControlError::BoxTooLarge("test"));
            }
            Ok(())
        }

        fn moof_count(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::Moof(_)))
                .count()
        }
    }

    impl ContainerControl for ScriptedControl {
        fn set_metadata(&mut self, metadata: &TrackMetadata) -> Result<(), ControlError> {
            self.record(Call::SetMetadata(metadata.kind()))
        }

        fn generate_ftyp(&mut self) -> Result<(), ControlError> {
            self.record(Call::Ftyp)?;
            self.bufs.push(b"ftyp".to_vec());
            Ok(())
        }

        fn generate_moov(&mut self, _fragments: Fragments<'_>) -> Result<(), ControlError> {
            self.record(Call::Moov)?;
            self.bufs.push(b"moov".to_vec());
            Ok(())
        }

        fn generate_moof(
            &mut self,
            tracks: TrackSet,
            mut fragments: Fragments<'_>,
        ) -> Result<(), ControlError> {
            self.record(Call::Moof(tracks))?;
            for kind in [TrackKind::Video, TrackKind::Audio] {
                if let Some(buffer) = fragments.get_mut(kind) {
                    buffer.take_fragment();
                }
            }
            self.bufs.push(b"moof".to_vec());
            Ok(())
        }

        fn take_bufs(&mut self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.bufs)
        }
    }

    fn scripted(tracks: TrackSet) -> IsoMediaWriter<ScriptedControl> {
        IsoMediaWriter::with_control(tracks, WriterConfig::default(), ScriptedControl::default())
            .unwrap()
    }

    fn amr() -> TrackMetadata {
        TrackMetadata::Amr { channels: 1 }
    }

    fn avc() -> TrackMetadata {
        TrackMetadata::Avc {
            width: 320,
            height: 240,
            frame_rate: 30,
        }
    }

    fn amr_frames(from_us: u64, to_us: u64) -> Vec<EncodedFrame> {
        (from_us..=to_us)
            .step_by(20_000)
            .map(|ts| EncodedFrame::new(FrameType::AmrAudioFrame, ts, vec![0x3c; 32]))
            .collect()
    }

    fn avc_frames(from_us: u64, to_us: u64) -> Vec<EncodedFrame> {
        (from_us..=to_us)
            .step_by(100_000)
            .map(|ts| {
                let frame_type = if ts % 1_000_000 == 0 {
                    FrameType::AvcIFrame
                } else {
                    FrameType::AvcPFrame
                };
                EncodedFrame::new(frame_type, ts, vec![0, 0, 0, 2, 0x65, 0x88])
            })
            .collect()
    }

    fn csd(frame_type: FrameType) -> EncodedFrame {
        EncodedFrame::new(frame_type, 0, vec![1, 0x42, 0, 0x1e, 0xff, 0xe1, 0, 0])
    }

    #[test]
    fn test_audio_only_amr_session() {
        let mut writer = IsoMediaWriter::new(TrackSet::AUDIO, WriterConfig::default()).unwrap();
        writer.set_metadata(amr()).unwrap();

        let status = writer
            .write_encoded_track(vec![EncodedFrame::new(FrameType::AmrCsd, 0, Vec::new())], WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);
        assert_eq!(writer.state(), MuxerState::Head);
        assert!(writer.get_container_data(ReadFlags::NONE).is_empty());

        let status = writer
            .write_encoded_track(amr_frames(0, 2_100_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(writer.state(), MuxerState::Fragmenting);

        let data = writer.get_container_data(ReadFlags::NONE);
        assert_eq!(data.buffers.len(), 2);
        assert_eq!(&data.buffers[0][4..8], b"ftyp");
        assert!(data.buffers[0].windows(4).any(|w| w == b"moov"));
        assert_eq!(&data.buffers[1][4..8], b"moof");
        assert!(!data.writing_complete);

        let status = writer
            .write_encoded_track(Vec::new(), WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(writer.state(), MuxerState::Done);

        let data = writer.get_container_data(ReadFlags::NONE);
        assert_eq!(data.buffers.len(), 1);
        assert_eq!(&data.buffers[0][4..8], b"moof");
        assert!(data.writing_complete);
        assert!(writer.is_writing_complete());
    }

    #[test]
    fn test_video_cannot_race_ahead_of_audio() {
        let mut writer = scripted(TrackSet::AUDIO_VIDEO);
        writer.set_metadata(amr()).unwrap();
        writer.set_metadata(avc()).unwrap();
        writer
            .write_encoded_track(vec![csd(FrameType::AvcCsd), csd(FrameType::AmrCsd)], WriteFlags::NONE)
            .unwrap();

        let status = writer
            .write_encoded_track(avc_frames(0, 2_500_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);
        let status = writer
            .write_encoded_track(amr_frames(0, 1_900_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);
        assert_eq!(writer.state(), MuxerState::Head);
        assert_eq!(writer.control().moof_count(), 0);
        assert!(writer.get_container_data(ReadFlags::NONE).is_empty());

        let status = writer
            .write_encoded_track(amr_frames(1_920_000, 2_000_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(
            writer.control().calls,
            vec![
                Call::SetMetadata(MetadataKind::Amr),
                Call::SetMetadata(MetadataKind::Avc),
                Call::Ftyp,
                Call::Moov,
                Call::Moof(TrackSet::AUDIO_VIDEO),
            ]
        );
        assert_eq!(writer.get_container_data(ReadFlags::NONE).buffers.len(), 3);
    }

    #[test]
    fn test_end_of_stream_on_one_track_waits_for_the_other() {
        let mut writer = scripted(TrackSet::AUDIO_VIDEO);
        writer.set_metadata(amr()).unwrap();
        writer.set_metadata(avc()).unwrap();
        writer
            .write_encoded_track(vec![csd(FrameType::AvcCsd), csd(FrameType::AmrCsd)], WriteFlags::NONE)
            .unwrap();

        let status = writer
            .write_encoded_track(avc_frames(0, 500_000), WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);

        let status = writer
            .write_encoded_track(amr_frames(0, 400_000), WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(writer.state(), MuxerState::Done);
        assert_eq!(writer.control().moof_count(), 1);
    }

    #[test]
    fn test_end_of_stream_drains_in_one_cycle() {
        let mut writer = scripted(TrackSet::AUDIO);
        writer.set_metadata(amr()).unwrap();
        writer
            .write_encoded_track(vec![csd(FrameType::AmrCsd)], WriteFlags::NONE)
            .unwrap();
        writer
            .write_encoded_track(amr_frames(0, 2_100_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(writer.control().moof_count(), 1);

        writer
            .write_encoded_track(amr_frames(2_120_000, 2_500_000), WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(writer.state(), MuxerState::Done);
        assert_eq!(writer.control().moof_count(), 2);
    }

    #[test]
    fn test_end_of_stream_before_codec_config() {
        let mut writer = scripted(TrackSet::AUDIO);
        writer.set_metadata(amr()).unwrap();

        let status = writer
            .write_encoded_track(Vec::new(), WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(status, WriteStatus::AwaitingCodecConfig);
        assert_eq!(writer.state(), MuxerState::Head);

        let status = writer
            .write_encoded_track(vec![csd(FrameType::AmrCsd)], WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(writer.state(), MuxerState::Done);
        assert_eq!(
            writer.control().calls[1..],
            [Call::Ftyp, Call::Moov, Call::Moof(TrackSet::AUDIO)]
        );
    }

    #[test]
    fn test_awaits_codec_config_of_every_track() {
        let mut writer = scripted(TrackSet::AUDIO_VIDEO);
        writer.set_metadata(amr()).unwrap();
        writer.set_metadata(avc()).unwrap();

        let status = writer
            .write_encoded_track(vec![csd(FrameType::AmrCsd)], WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::AwaitingCodecConfig);

        let mut frames = amr_frames(0, 3_000_000);
        frames.extend(avc_frames(0, 3_000_000));
        let status = writer.write_encoded_track(frames, WriteFlags::NONE).unwrap();
        assert_eq!(status, WriteStatus::AwaitingCodecConfig);
        assert_eq!(writer.control().moof_count(), 0);
    }

    #[test]
    fn test_done_is_terminal() {
        let mut writer = scripted(TrackSet::AUDIO);
        writer.set_metadata(amr()).unwrap();
        writer
            .write_encoded_track(vec![csd(FrameType::AmrCsd)], WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(writer.state(), MuxerState::Done);

        for _ in 0..2 {
            let err = writer
                .write_encoded_track(amr_frames(0, 0), WriteFlags::NONE)
                .unwrap_err();
            assert!(matches!(
                err,
                MuxError::InvalidStateTransition {
                    state: MuxerState::Done,
                    ..
                }
            ));
            assert_eq!(writer.state(), MuxerState::Done);
        }

        let err = writer.set_metadata(avc()).unwrap_err();
        assert!(matches!(err, MuxError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_container_data_is_drained_once() {
        let mut writer = scripted(TrackSet::AUDIO);
        writer.set_metadata(amr()).unwrap();
        writer
            .write_encoded_track(vec![csd(FrameType::AmrCsd)], WriteFlags::NONE)
            .unwrap();
        writer
            .write_encoded_track(amr_frames(0, 2_000_000), WriteFlags::NONE)
            .unwrap();

        assert_eq!(writer.get_container_data(ReadFlags::NONE).buffers.len(), 3);
        let data = writer.get_container_data(ReadFlags::NONE);
        assert!(data.is_empty());
        assert!(!data.writing_complete);
    }

    #[test]
    fn test_flush_marks_writing_complete() {
        let mut writer = scripted(TrackSet::AUDIO);
        writer.set_metadata(amr()).unwrap();

        let data = writer.get_container_data(ReadFlags::FLUSH_NEEDED);
        assert!(data.is_empty());
        assert!(data.writing_complete);
        assert!(writer.get_container_data(ReadFlags::NONE).writing_complete);
    }

    #[test]
    fn test_configuration_errors() {
        let mut writer = scripted(TrackSet::AUDIO);
        let err = writer
            .write_encoded_track(amr_frames(0, 0), WriteFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, MuxError::NotConfigured));

        let err = writer.set_metadata(avc()).unwrap_err();
        assert!(matches!(err, MuxError::UndeclaredTrack(TrackKind::Video)));

        let err = writer
            .set_metadata(TrackMetadata::Vp8 {
                width: 320,
                height: 240,
            })
            .unwrap_err();
        assert!(matches!(err, MuxError::UnsupportedCodec(MetadataKind::Vp8)));

        writer.set_metadata(amr()).unwrap();
        let err = writer
            .set_metadata(TrackMetadata::Evrc { channels: 1 })
            .unwrap_err();
        assert!(matches!(err, MuxError::TrackAlreadyConfigured(TrackKind::Audio)));

        let err = writer
            .write_encoded_track(avc_frames(0, 0), WriteFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidFrameType(FrameType::AvcIFrame)));

        let err = writer
            .write_encoded_track(
                vec![EncodedFrame::new(FrameType::OpusAudioFrame, 0, vec![0xfc])],
                WriteFlags::NONE,
            )
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidFrameType(FrameType::OpusAudioFrame)));

        let mut empty = scripted(TrackSet::default());
        let err = empty
            .write_encoded_track(Vec::new(), WriteFlags::END_OF_STREAM)
            .unwrap_err();
        assert!(matches!(err, MuxError::NotConfigured));
    }

    #[test]
    fn test_generation_failure_poisons_writer() {
        let mut writer = IsoMediaWriter::with_control(
            TrackSet::AUDIO,
            WriterConfig::default(),
            ScriptedControl::failing_on(Call::Moov),
        )
        .unwrap();
        writer.set_metadata(amr()).unwrap();

        let err = writer
            .write_encoded_track(vec![csd(FrameType::AmrCsd)], WriteFlags::END_OF_STREAM)
            .unwrap_err();
        assert!(matches!(
            err,
            MuxError::ContainerGenerationFailed {
                stage: BoxStage::Moov,
                ..
            }
        ));
        assert_eq!(writer.state(), MuxerState::Head);

        // The staged ftyp is never handed out
        let data = writer.get_container_data(ReadFlags::FLUSH_NEEDED);
        assert!(data.is_empty());

        let err = writer
            .write_encoded_track(amr_frames(0, 0), WriteFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, MuxError::Poisoned));
    }

    #[test]
    fn test_video_only_session() {
        let mut writer = scripted(TrackSet::VIDEO);
        writer.set_metadata(avc()).unwrap();

        let status = writer
            .write_encoded_track(vec![csd(FrameType::AvcCsd)], WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);

        let status = writer
            .write_encoded_track(avc_frames(0, 1_900_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);
        assert_eq!(writer.state(), MuxerState::Head);

        // I-frame at 2s closes the first fragment
        let status = writer
            .write_encoded_track(avc_frames(2_000_000, 2_000_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(writer.state(), MuxerState::Fragmenting);
        assert_eq!(
            writer.control().calls,
            vec![
                Call::SetMetadata(MetadataKind::Avc),
                Call::Ftyp,
                Call::Moov,
                Call::Moof(TrackSet::VIDEO),
            ]
        );
        assert_eq!(writer.get_container_data(ReadFlags::NONE).buffers.len(), 3);

        let status = writer
            .write_encoded_track(avc_frames(2_100_000, 2_500_000), WriteFlags::END_OF_STREAM)
            .unwrap();
        assert_eq!(status, WriteStatus::Muxed);
        assert_eq!(writer.state(), MuxerState::Done);
        assert_eq!(writer.control().moof_count(), 2);
        assert!(writer.get_container_data(ReadFlags::NONE).writing_complete);
    }

    #[test]
    fn test_rejected_batch_buffers_nothing() {
        let mut writer = scripted(TrackSet::AUDIO);
        writer.set_metadata(amr()).unwrap();

        let mut frames = amr_frames(0, 0);
        frames.extend(avc_frames(0, 0));
        let err = writer
            .write_encoded_track(frames, WriteFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidFrameType(FrameType::AvcIFrame)));
        assert!(writer.audio.as_ref().unwrap().is_empty());

        writer
            .write_encoded_track(amr_frames(0, 100_000), WriteFlags::END_OF_STREAM)
            .unwrap();
        let buffered = writer.audio.as_ref().unwrap().len();

        // Codec config is still accepted after end of stream, samples are not
        let frames = vec![csd(FrameType::AmrCsd), amr_frames(200_000, 200_000).remove(0)];
        let err = writer
            .write_encoded_track(frames, WriteFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, MuxError::EndOfStreamReached(TrackKind::Audio)));
        let audio = writer.audio.as_ref().unwrap();
        assert_eq!(audio.len(), buffered);
        assert!(!audio.has_csd());
    }

    #[test]
    fn test_empty_write_is_a_no_op_before_configuration() {
        let mut writer = scripted(TrackSet::AUDIO);
        let status = writer
            .write_encoded_track(Vec::new(), WriteFlags::NONE)
            .unwrap();
        assert_eq!(status, WriteStatus::Buffering);
        assert!(writer.control().calls.is_empty());
    }

    #[test]
    fn test_oversized_video_is_rejected() {
        let mut writer = IsoMediaWriter::new(TrackSet::VIDEO, WriterConfig::default()).unwrap();
        let err = writer
            .set_metadata(TrackMetadata::Avc {
                width: 1920,
                height: 65_536,
                frame_rate: 30,
            })
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidConfig(_)));

        // The track stays unconfigured and can still be set up
        writer.set_metadata(avc()).unwrap();
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = WriterConfig {
            fragment_duration_us: 0,
            ..WriterConfig::default()
        };
        let err = IsoMediaWriter::new(TrackSet::AUDIO, config).unwrap_err();
        assert!(matches!(err, MuxError::InvalidConfig(_)));
    }
}
