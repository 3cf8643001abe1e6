//! Per-track buffering of encoded frames until they are muxed into a fragment.

use isomux_common::{EncodedFrame, FrameType, TrackKind};

use crate::error::{MuxError, MuxResult};

/// Unflushed frames of one track
#[derive(Debug)]
pub struct FragmentBuffer {
    kind: TrackKind,
    target_duration_us: u64,
    frames: Vec<EncodedFrame>,
    /// Codec specific data; kept out of the sample sequence
    csd: Option<EncodedFrame>,
    end_of_stream: bool,
}

impl FragmentBuffer {
    pub fn new(kind: TrackKind, target_duration_us: u64) -> Self {
        Self {
            kind,
            target_duration_us,
            frames: Vec::new(),
            csd: None,
            end_of_stream: false,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn target_duration_us(&self) -> u64 {
        self.target_duration_us
    }

    /// Add a frame of this buffer's track.
    ///
    /// A CSD frame is captured as codec config instead of being queued; only
    /// the first one is kept.
    pub fn add_frame(&mut self, frame: EncodedFrame) -> MuxResult<()> {
        if frame.track_kind() != Some(self.kind) {
            return Err(MuxError::InvalidFrameType(frame.frame_type));
        }

        if frame.frame_type.is_csd() {
            if self.csd.is_some() {
                tracing::warn!(track = %self.kind, "Ignoring repeated codec config frame");
            } else {
                tracing::debug!(track = %self.kind, size = frame.payload.len(), "Captured codec config");
                self.csd = Some(frame);
            }
            return Ok(());
        }

        if self.end_of_stream {
            return Err(MuxError::EndOfStreamReached(self.kind));
        }

        self.frames.push(frame);
        Ok(())
    }

    pub fn set_end_of_stream(&mut self) {
        self.end_of_stream = true;
    }

    pub fn has_csd(&self) -> bool {
        self.csd.is_some()
    }

    pub fn csd(&self) -> Option<&EncodedFrame> {
        self.csd.as_ref()
    }

    pub fn eos(&self) -> bool {
        self.end_of_stream
    }

    /// Presentation time spanned by the buffered frames
    pub fn buffered_duration_us(&self) -> u64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_us.saturating_sub(first.timestamp_us),
            _ => 0,
        }
    }

    /// Whether a full fragment is buffered, or the stream ended.
    ///
    /// Video additionally needs the I-frame that starts the next fragment.
    pub fn has_enough_data(&self) -> bool {
        if self.end_of_stream {
            return true;
        }
        match self.kind {
            TrackKind::Audio => self.buffered_duration_us() >= self.target_duration_us,
            TrackKind::Video => self.keyframe_cut().is_some(),
        }
    }

    /// Index of the first non-leading I-frame at or past `first + target`
    fn keyframe_cut(&self) -> Option<usize> {
        let first_ts = self.frames.first()?.timestamp_us;
        let limit = first_ts.saturating_add(self.target_duration_us);
        self.frames
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, f)| f.frame_type == FrameType::AvcIFrame && f.timestamp_us >= limit)
            .map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[EncodedFrame] {
        &self.frames
    }

    /// Remove and return the frames of the next fragment.
    ///
    /// After end of stream everything is drained. Otherwise an audio fragment
    /// ends at the first frame at or past `first + target`. A video fragment
    /// ends at the I-frame found by `has_enough_data`, so every fragment
    /// starts with a sync sample; without one nothing is drained.
    pub fn take_fragment(&mut self) -> Vec<EncodedFrame> {
        let Some(first_ts) = self.frames.first().map(|f| f.timestamp_us) else {
            return Vec::new();
        };
        if self.end_of_stream {
            return std::mem::take(&mut self.frames);
        }

        let cut = match self.kind {
            TrackKind::Audio => {
                let limit = first_ts.saturating_add(self.target_duration_us);
                self.frames
                    .iter()
                    .position(|f| f.timestamp_us >= limit)
                    .unwrap_or(self.frames.len())
                    .max(1)
            }
            TrackKind::Video => match self.keyframe_cut() {
                Some(cut) => cut,
                None => return Vec::new(),
            },
        };

        self.frames.drain(..cut).collect()
    }
}
