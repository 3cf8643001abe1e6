//! ISO-BMFF box building functions for fragmented MP4/3GP.

use isomux_common::TrackKind;

use crate::config::ContainerBrand;
use crate::control::ControlError;

/// Sample flags for a sync sample: depends_on = 2, is_non_sync = 0
pub const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
/// Sample flags for a non-sync sample: depends_on = 1, is_non_sync = 1
pub const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

/// Largest width or height a visual sample entry can carry
pub const MAX_DIMENSION: u32 = 0xffff;

/// Description of one track in the moov
#[derive(Debug, Clone)]
pub struct TrackHeader {
    pub track_id: u32,
    pub kind: TrackKind,
    pub timescale: u32,
    /// Video only, in pixels
    pub width: u32,
    pub height: u32,
    /// Complete sample entry box (avc1, mp4a, samr, ...)
    pub sample_entry: Vec<u8>,
}

/// One sample of a track run
#[derive(Debug, Clone)]
pub struct RunSample {
    pub duration: u32,
    pub data: Vec<u8>,
    /// Per-sample flags; written only when the run carries them
    pub flags: u32,
}

/// Samples of one track inside a fragment
#[derive(Debug, Clone)]
pub struct TrackRun {
    pub track_id: u32,
    pub base_media_decode_time: u64,
    pub samples: Vec<RunSample>,
    pub with_sample_flags: bool,
}

impl TrackRun {
    fn data_size(&self) -> usize {
        self.samples.iter().map(|s| s.data.len()).sum()
    }
}

/// Build a generic MP4 box with type and payload
pub fn build_box(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let size = (8 + payload.len()) as u32;
    let mut buf = Vec::with_capacity(size as usize);
    buf.extend_from_slice(&size.to_be_bytes());
    buf.extend_from_slice(typ);
    buf.extend_from_slice(payload);
    buf
}

/// Build ftyp box for the given brand family
pub fn build_ftyp(brand: ContainerBrand) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(brand.major_brand()); // Major brand
    payload.extend_from_slice(&0u32.to_be_bytes()); // Minor version
    for compatible in brand.compatible_brands() {
        payload.extend_from_slice(*compatible);
    }
    build_box(b"ftyp", &payload)
}

/// Build moov box for the configured tracks
pub fn build_moov(movie_timescale: u32, tracks: &[TrackHeader]) -> Vec<u8> {
    let next_track_id = tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;

    let mut payload = Vec::new();

    // mvhd (movie header)
    payload.extend_from_slice(&build_mvhd(movie_timescale, next_track_id));

    // mvex (movie extends) - required for fMP4
    payload.extend_from_slice(&build_mvex(tracks));

    for track in tracks {
        payload.extend_from_slice(&build_trak(track));
    }

    build_box(b"moov", &payload)
}

/// Build mvhd (movie header) box
fn build_mvhd(timescale: u32, next_track_id: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // Creation time
    payload.extend_from_slice(&0u32.to_be_bytes()); // Modification time
    payload.extend_from_slice(&timescale.to_be_bytes()); // Timescale
    payload.extend_from_slice(&0u32.to_be_bytes()); // Duration (unknown for live)
    payload.extend_from_slice(&0x0001_0000_u32.to_be_bytes()); // Rate (1.0)
    payload.extend_from_slice(&0x0100_u16.to_be_bytes()); // Volume (1.0)
    payload.extend_from_slice(&[0u8; 10]); // Reserved
    write_unity_matrix(&mut payload);
    payload.extend_from_slice(&[0u8; 24]); // Pre-defined
    payload.extend_from_slice(&next_track_id.to_be_bytes()); // Next track ID
    build_box(b"mvhd", &payload)
}

fn write_unity_matrix(payload: &mut Vec<u8>) {
    payload.extend_from_slice(&0x0001_0000_u32.to_be_bytes());
    payload.extend_from_slice(&[0u8; 12]);
    payload.extend_from_slice(&0x0001_0000_u32.to_be_bytes());
    payload.extend_from_slice(&[0u8; 12]);
    payload.extend_from_slice(&0x4000_0000_u32.to_be_bytes());
}

/// Build mvex (movie extends) box with trex for each track
fn build_mvex(tracks: &[TrackHeader]) -> Vec<u8> {
    let mut payload = Vec::new();
    for track in tracks {
        payload.extend_from_slice(&build_trex(track.track_id));
    }
    build_box(b"mvex", &payload)
}

/// Build trex (track extends) box
fn build_trex(track_id: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    payload.extend_from_slice(&track_id.to_be_bytes()); // Track ID
    payload.extend_from_slice(&1u32.to_be_bytes()); // Default sample description index
    payload.extend_from_slice(&0u32.to_be_bytes()); // Default sample duration
    payload.extend_from_slice(&0u32.to_be_bytes()); // Default sample size
    payload.extend_from_slice(&0u32.to_be_bytes()); // Default sample flags
    build_box(b"trex", &payload)
}

fn build_trak(track: &TrackHeader) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&build_tkhd(track));
    payload.extend_from_slice(&build_mdia(track));
    build_box(b"trak", &payload)
}

/// Build tkhd (track header) box
fn build_tkhd(track: &TrackHeader) -> Vec<u8> {
    let is_video = track.kind == TrackKind::Video;

    let mut payload = Vec::new();
    payload.extend_from_slice(&0x0000_0003_u32.to_be_bytes()); // Version 0, flags: enabled + in_movie
    payload.extend_from_slice(&0u32.to_be_bytes()); // Creation time
    payload.extend_from_slice(&0u32.to_be_bytes()); // Modification time
    payload.extend_from_slice(&track.track_id.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes()); // Reserved
    payload.extend_from_slice(&0u32.to_be_bytes()); // Duration
    payload.extend_from_slice(&[0u8; 8]); // Reserved
    payload.extend_from_slice(&0u16.to_be_bytes()); // Layer
    payload.extend_from_slice(&0u16.to_be_bytes()); // Alternate group
    let volume: u16 = if is_video { 0 } else { 0x0100 };
    payload.extend_from_slice(&volume.to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes()); // Reserved
    write_unity_matrix(&mut payload);
    // Width and height in 16.16 fixed-point (0 for audio)
    payload.extend_from_slice(&(track.width << 16).to_be_bytes());
    payload.extend_from_slice(&(track.height << 16).to_be_bytes());
    build_box(b"tkhd", &payload)
}

fn build_mdia(track: &TrackHeader) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&build_mdhd(track.timescale));
    match track.kind {
        TrackKind::Video => payload.extend_from_slice(&build_hdlr(b"vide", b"VideoHandler\0")),
        TrackKind::Audio => payload.extend_from_slice(&build_hdlr(b"soun", b"SoundHandler\0")),
    }
    payload.extend_from_slice(&build_minf(track));
    build_box(b"mdia", &payload)
}

/// Build mdhd (media header) box
fn build_mdhd(timescale: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // Creation time
    payload.extend_from_slice(&0u32.to_be_bytes()); // Modification time
    payload.extend_from_slice(&timescale.to_be_bytes()); // Timescale
    payload.extend_from_slice(&0u32.to_be_bytes()); // Duration (unknown)
    payload.extend_from_slice(&encode_language_code("und"));
    payload.extend_from_slice(&0u16.to_be_bytes()); // Quality
    build_box(b"mdhd", &payload)
}

/// Encode ISO 639-2/T language code
fn encode_language_code(language: &str) -> [u8; 2] {
    let chars: Vec<char> = language.chars().take(3).collect();
    let c1 = chars.first().copied().unwrap_or('u') as u16;
    let c2 = chars.get(1).copied().unwrap_or('n') as u16;
    let c3 = chars.get(2).copied().unwrap_or('d') as u16;

    let packed = ((c1.saturating_sub(0x60) & 0x1F) << 10)
        | ((c2.saturating_sub(0x60) & 0x1F) << 5)
        | (c3.saturating_sub(0x60) & 0x1F);

    packed.to_be_bytes()
}

/// Build hdlr (handler) box
fn build_hdlr(handler_type: &[u8; 4], name: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // Pre-defined
    payload.extend_from_slice(handler_type); // Handler type
    payload.extend_from_slice(&[0u8; 12]); // Reserved
    payload.extend_from_slice(name); // Name (null-terminated)
    build_box(b"hdlr", &payload)
}

fn build_minf(track: &TrackHeader) -> Vec<u8> {
    let mut payload = Vec::new();
    match track.kind {
        TrackKind::Video => {
            // vmhd: version 0, flags 1, graphics mode + op color
            let mut vmhd = 0x0000_0001_u32.to_be_bytes().to_vec();
            vmhd.extend_from_slice(&[0u8; 8]);
            payload.extend_from_slice(&build_box(b"vmhd", &vmhd));
        }
        TrackKind::Audio => {
            // smhd: version + flags, balance, reserved
            payload.extend_from_slice(&build_box(b"smhd", &[0u8; 8]));
        }
    }
    payload.extend_from_slice(&build_dinf());
    payload.extend_from_slice(&build_stbl(&track.sample_entry));
    build_box(b"minf", &payload)
}

/// Build dinf (data information) box
fn build_dinf() -> Vec<u8> {
    // dref with self-contained data reference
    let mut dref_payload = Vec::new();
    dref_payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    dref_payload.extend_from_slice(&1u32.to_be_bytes()); // Entry count
    let url_payload = [0x00, 0x00, 0x00, 0x01]; // Flags: self-contained
    dref_payload.extend_from_slice(&build_box(b"url ", &url_payload));
    let dref = build_box(b"dref", &dref_payload);

    build_box(b"dinf", &dref)
}

/// Build stbl (sample table) box; sample tables are empty, data lives in moof
fn build_stbl(sample_entry: &[u8]) -> Vec<u8> {
    let mut stsd = Vec::new();
    stsd.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    stsd.extend_from_slice(&1u32.to_be_bytes()); // Entry count
    stsd.extend_from_slice(sample_entry);

    let empty_table = [0u8; 8]; // Version + flags, entry count
    let empty_stsz = [0u8; 12]; // Version + flags, sample size (0 = variable), sample count

    let mut payload = Vec::new();
    payload.extend_from_slice(&build_box(b"stsd", &stsd));
    payload.extend_from_slice(&build_box(b"stts", &empty_table));
    payload.extend_from_slice(&build_box(b"stsc", &empty_table));
    payload.extend_from_slice(&build_box(b"stsz", &empty_stsz));
    payload.extend_from_slice(&build_box(b"stco", &empty_table));
    build_box(b"stbl", &payload)
}

// ============================================================================
// Sample Entries
// ============================================================================

/// Build avc1 (H.264 sample entry) box around an AVCDecoderConfigurationRecord
pub fn build_avc1(width: u32, height: u32, avcc_record: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&[0u8; 6]); // Reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // Data reference index
    payload.extend_from_slice(&0u16.to_be_bytes()); // Pre-defined
    payload.extend_from_slice(&0u16.to_be_bytes()); // Reserved
    payload.extend_from_slice(&[0u8; 12]); // Pre-defined
    payload.extend_from_slice(&(width.min(MAX_DIMENSION) as u16).to_be_bytes());
    payload.extend_from_slice(&(height.min(MAX_DIMENSION) as u16).to_be_bytes());
    payload.extend_from_slice(&0x0048_0000_u32.to_be_bytes()); // Horizontal resolution (72 dpi)
    payload.extend_from_slice(&0x0048_0000_u32.to_be_bytes()); // Vertical resolution (72 dpi)
    payload.extend_from_slice(&0u32.to_be_bytes()); // Reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // Frame count
    payload.extend_from_slice(&[0u8; 32]); // Compressor name
    payload.extend_from_slice(&0x0018_u16.to_be_bytes()); // Depth: 24-bit color
    payload.extend_from_slice(&0xffff_u16.to_be_bytes()); // Pre-defined (-1)
    payload.extend_from_slice(&build_box(b"avcC", avcc_record));
    build_box(b"avc1", &payload)
}

/// AudioSampleEntry fields shared by mp4a, samr, sawb and sevc
fn audio_sample_entry_fields(channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&[0u8; 6]); // Reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // Data reference index
    payload.extend_from_slice(&0u16.to_be_bytes()); // Version
    payload.extend_from_slice(&0u16.to_be_bytes()); // Revision level
    payload.extend_from_slice(&0u32.to_be_bytes()); // Vendor
    payload.extend_from_slice(&channels.to_be_bytes()); // Channel count
    payload.extend_from_slice(&16u16.to_be_bytes()); // Sample size (16 bits)
    payload.extend_from_slice(&0u16.to_be_bytes()); // Compression ID
    payload.extend_from_slice(&0u16.to_be_bytes()); // Packet size
    // 16.16 fixed-point; rates that do not fit are left to the mdhd timescale
    let fixed_rate = if sample_rate > 0xffff { 0 } else { sample_rate << 16 };
    payload.extend_from_slice(&fixed_rate.to_be_bytes());
    payload
}

/// Build mp4a (AAC sample entry) box.
///
/// An empty `audio_specific_config` is replaced by an AAC-LC config derived
/// from the sample rate and channel count.
pub fn build_mp4a(sample_rate: u32, channels: u16, bitrate: u32, audio_specific_config: &[u8]) -> Vec<u8> {
    let mut payload = audio_sample_entry_fields(channels, sample_rate);
    let asc = if audio_specific_config.is_empty() {
        build_audio_specific_config(sample_rate, channels)
    } else {
        audio_specific_config.to_vec()
    };
    payload.extend_from_slice(&build_esds(&asc, bitrate));
    build_box(b"mp4a", &payload)
}

/// Build esds (Elementary Stream Descriptor) box
fn build_esds(audio_specific_config: &[u8], bitrate: u32) -> Vec<u8> {
    // ES Descriptor
    let mut es_descriptor = Vec::new();
    es_descriptor.extend_from_slice(&0u16.to_be_bytes()); // ES_ID
    es_descriptor.push(0); // streamDependenceFlag, URL_Flag, OCRstreamFlag, streamPriority

    // DecoderConfigDescriptor
    let mut decoder_config = Vec::new();
    decoder_config.push(0x40); // objectTypeIndication: Audio ISO/IEC 14496-3 (AAC)
    decoder_config.push((0x05 << 2) | 0x01); // streamType = AudioStream, upStream = 0, reserved = 1
    decoder_config.extend_from_slice(&[0x00, 0x00, 0x00]); // bufferSizeDB (24 bits)
    decoder_config.extend_from_slice(&bitrate.to_be_bytes()); // maxBitrate
    decoder_config.extend_from_slice(&bitrate.to_be_bytes()); // avgBitrate

    // DecoderSpecificInfo (AudioSpecificConfig)
    decoder_config.extend_from_slice(&build_descriptor(0x05, audio_specific_config));
    es_descriptor.extend_from_slice(&build_descriptor(0x04, &decoder_config));

    // SLConfigDescriptor (predefined = 2 for MP4)
    es_descriptor.extend_from_slice(&build_descriptor(0x06, &[0x02]));

    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    payload.extend_from_slice(&build_descriptor(0x03, &es_descriptor));
    build_box(b"esds", &payload)
}

/// Build ISO 14496 descriptor with tag and length
fn build_descriptor(tag: u8, data: &[u8]) -> Vec<u8> {
    let mut result = vec![tag];
    let len = data.len();
    if len < 128 {
        result.push(len as u8);
    } else {
        // Multi-byte length encoding, 7 bits each
        result.push(0x80 | ((len >> 21) & 0x7F) as u8);
        result.push(0x80 | ((len >> 14) & 0x7F) as u8);
        result.push(0x80 | ((len >> 7) & 0x7F) as u8);
        result.push((len & 0x7F) as u8);
    }
    result.extend_from_slice(data);
    result
}

/// Build AudioSpecificConfig for AAC-LC
pub fn build_audio_specific_config(sample_rate: u32, channels: u16) -> Vec<u8> {
    // audioObjectType (5 bits) = 2, samplingFrequencyIndex (4 bits), channelConfiguration (4 bits)
    let sample_rate_index: u8 = match sample_rate {
        96000 => 0,
        88200 => 1,
        64000 => 2,
        48000 => 3,
        44100 => 4,
        32000 => 5,
        24000 => 6,
        22050 => 7,
        16000 => 8,
        12000 => 9,
        11025 => 10,
        8000 => 11,
        7350 => 12,
        _ => 3, // Default to 48000 Hz
    };

    let channel_config = channels.min(7) as u8;

    let byte0 = (2 << 3) | (sample_rate_index >> 1);
    let byte1 = ((sample_rate_index & 1) << 7) | (channel_config << 3);

    vec![byte0, byte1]
}

/// Build samr (AMR-NB) or sawb (AMR-WB) sample entry with its damr box
pub fn build_amr_entry(wide_band: bool, channels: u16) -> Vec<u8> {
    let sample_rate = if wide_band { 16000 } else { 8000 };
    let mut payload = audio_sample_entry_fields(channels, sample_rate);

    let mut damr = Vec::new();
    damr.extend_from_slice(&[0u8; 4]); // Vendor
    damr.push(0); // Decoder version
    damr.extend_from_slice(&0x83ff_u16.to_be_bytes()); // Mode set: all modes
    damr.push(0); // Mode change period
    damr.push(1); // Frames per sample
    payload.extend_from_slice(&build_box(b"damr", &damr));

    build_box(if wide_band { b"sawb" } else { b"samr" }, &payload)
}

/// Build sevc (EVRC) sample entry with its devc box
pub fn build_evrc_entry(channels: u16) -> Vec<u8> {
    let mut payload = audio_sample_entry_fields(channels, 8000);

    let mut devc = Vec::new();
    devc.extend_from_slice(&[0u8; 4]); // Vendor
    devc.push(0); // Decoder version
    devc.push(1); // Frames per sample
    payload.extend_from_slice(&build_box(b"devc", &devc));

    build_box(b"sevc", &payload)
}

// ============================================================================
// Media Segment Building Functions (moof + mdat)
// ============================================================================

/// Build one media segment: a moof with one traf per run, then its mdat.
///
/// mdat payload order follows `runs`.
pub fn build_media_segment(sequence_number: u32, runs: &[TrackRun]) -> Result<Vec<u8>, ControlError> {
    let mdat_payload_size: usize = runs.iter().map(TrackRun::data_size).sum();
    let mdat_size = u32::try_from(8 + mdat_payload_size).map_err(|_| ControlError::BoxTooLarge("mdat"))?;

    // Build moof once to learn its size, then again with the real offsets
    let placeholder_offsets = vec![0u32; runs.len()];
    let moof_size = build_moof(sequence_number, runs, &placeholder_offsets).len();

    let mut offsets = Vec::with_capacity(runs.len());
    // Data starts after moof + mdat header (8 bytes)
    let mut offset = moof_size + 8;
    for run in runs {
        offsets.push(u32::try_from(offset).map_err(|_| ControlError::BoxTooLarge("trun"))?);
        offset += run.data_size();
    }
    let moof = build_moof(sequence_number, runs, &offsets);

    let mut segment = Vec::with_capacity(moof.len() + 8 + mdat_payload_size);
    segment.extend_from_slice(&moof);
    segment.extend_from_slice(&mdat_size.to_be_bytes());
    segment.extend_from_slice(b"mdat");
    for run in runs {
        for sample in &run.samples {
            segment.extend_from_slice(&sample.data);
        }
    }

    Ok(segment)
}

fn build_moof(sequence_number: u32, runs: &[TrackRun], data_offsets: &[u32]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&build_mfhd(sequence_number));
    for (run, &data_offset) in runs.iter().zip(data_offsets) {
        payload.extend_from_slice(&build_traf(run, data_offset));
    }
    build_box(b"moof", &payload)
}

/// Build mfhd (movie fragment header) box
fn build_mfhd(sequence_number: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // Version + flags
    payload.extend_from_slice(&sequence_number.to_be_bytes());
    build_box(b"mfhd", &payload)
}

fn build_traf(run: &TrackRun, data_offset: u32) -> Vec<u8> {
    let mut payload = Vec::new();

    // tfhd, flags 0x020000 = default-base-is-moof
    let mut tfhd = Vec::new();
    tfhd.extend_from_slice(&0x0002_0000_u32.to_be_bytes());
    tfhd.extend_from_slice(&run.track_id.to_be_bytes());
    payload.extend_from_slice(&build_box(b"tfhd", &tfhd));

    // tfdt, version 1 for 64-bit decode time
    let mut tfdt = Vec::new();
    tfdt.extend_from_slice(&0x0100_0000_u32.to_be_bytes());
    tfdt.extend_from_slice(&run.base_media_decode_time.to_be_bytes());
    payload.extend_from_slice(&build_box(b"tfdt", &tfdt));

    payload.extend_from_slice(&build_trun(run, data_offset));

    build_box(b"traf", &payload)
}

/// Build trun (track run) box
fn build_trun(run: &TrackRun, data_offset: u32) -> Vec<u8> {
    // 0x000001 = data-offset-present
    // 0x000100 = sample-duration-present
    // 0x000200 = sample-size-present
    // 0x000400 = sample-flags-present
    let mut flags: u32 = 0x000001 | 0x000100 | 0x000200;
    if run.with_sample_flags {
        flags |= 0x000400;
    }

    let mut payload = Vec::new();
    payload.extend_from_slice(&flags.to_be_bytes()); // Version 0 + flags
    payload.extend_from_slice(&(run.samples.len() as u32).to_be_bytes());
    payload.extend_from_slice(&data_offset.to_be_bytes());

    for sample in &run.samples {
        payload.extend_from_slice(&sample.duration.to_be_bytes());
        payload.extend_from_slice(&(sample.data.len() as u32).to_be_bytes());
        if run.with_sample_flags {
            payload.extend_from_slice(&sample.flags.to_be_bytes());
        }
    }

    build_box(b"trun", &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(data: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    }

    #[test]
    fn test_ftyp_brands() {
        let ftyp = build_ftyp(ContainerBrand::Mp4);
        assert_eq!(read_u32(&ftyp, 0) as usize, ftyp.len());
        assert_eq!(&ftyp[4..8], b"ftyp");
        assert_eq!(&ftyp[8..12], b"iso5");
        assert_eq!(ftyp.len(), 8 + 8 + 12);

        let ftyp = build_ftyp(ContainerBrand::ThreeGp);
        assert_eq!(&ftyp[8..12], b"3gp9");
        assert_eq!(&ftyp[16..20], b"3gp9");
        assert_eq!(&ftyp[20..24], b"isom");
    }

    #[test]
    fn test_audio_specific_config_generation() {
        // 48kHz stereo: (2 << 3) | (3 >> 1) = 0x11, ((3 & 1) << 7) | (2 << 3) = 0x90
        assert_eq!(build_audio_specific_config(48000, 2), vec![0x11, 0x90]);
        // 44.1kHz mono
        assert_eq!(build_audio_specific_config(44100, 1), vec![0x12, 0x08]);
    }

    #[test]
    fn test_high_sample_rate_does_not_wrap() {
        let mp4a = build_mp4a(96000, 2, 0, &[]);
        assert_eq!(read_u32(&mp4a, 32), 0);
        let mp4a = build_mp4a(48000, 2, 0, &[]);
        assert_eq!(read_u32(&mp4a, 32), 48000 << 16);
    }

    #[test]
    fn test_amr_entries() {
        let samr = build_amr_entry(false, 1);
        assert_eq!(&samr[4..8], b"samr");
        assert!(samr.windows(4).any(|w| w == b"damr"));
        // Sample rate field: 8000 << 16 at offset 8 + 24
        assert_eq!(read_u32(&samr, 32), 8000 << 16);

        let sawb = build_amr_entry(true, 1);
        assert_eq!(&sawb[4..8], b"sawb");
        assert_eq!(read_u32(&sawb, 32), 16000 << 16);

        let sevc = build_evrc_entry(1);
        assert_eq!(&sevc[4..8], b"sevc");
        assert!(sevc.windows(4).any(|w| w == b"devc"));
    }

    #[test]
    fn test_moov_track_layout() {
        let tracks = vec![
            TrackHeader {
                track_id: 1,
                kind: TrackKind::Video,
                timescale: 90000,
                width: 640,
                height: 480,
                sample_entry: build_avc1(640, 480, &[1, 0x42, 0, 0x1e, 0xff, 0xe1]),
            },
            TrackHeader {
                track_id: 2,
                kind: TrackKind::Audio,
                timescale: 8000,
                width: 0,
                height: 0,
                sample_entry: build_amr_entry(false, 1),
            },
        ];
        let moov = build_moov(1000, &tracks);
        assert_eq!(read_u32(&moov, 0) as usize, moov.len());
        assert_eq!(moov.windows(4).filter(|w| *w == b"trak").count(), 2);
        assert_eq!(moov.windows(4).filter(|w| *w == b"trex").count(), 2);
        assert!(moov.windows(4).any(|w| w == b"vide"));
        assert!(moov.windows(4).any(|w| w == b"soun"));

        // mvhd next_track_ID is the last field of mvhd
        let mvhd_size = read_u32(&moov, 8) as usize;
        assert_eq!(read_u32(&moov, 8 + mvhd_size - 4), 3);
    }

    #[test]
    fn test_media_segment_offsets() {
        let runs = vec![
            TrackRun {
                track_id: 1,
                base_media_decode_time: 0,
                samples: vec![
                    RunSample {
                        duration: 3000,
                        data: vec![0xaa; 10],
                        flags: SYNC_SAMPLE_FLAGS,
                    },
                    RunSample {
                        duration: 3000,
                        data: vec![0xbb; 6],
                        flags: NON_SYNC_SAMPLE_FLAGS,
                    },
                ],
                with_sample_flags: true,
            },
            TrackRun {
                track_id: 2,
                base_media_decode_time: 160,
                samples: vec![RunSample {
                    duration: 160,
                    data: vec![0xcc; 4],
                    flags: 0,
                }],
                with_sample_flags: false,
            },
        ];

        let segment = build_media_segment(7, &runs).unwrap();
        assert_eq!(&segment[4..8], b"moof");
        let moof_size = read_u32(&segment, 0) as usize;
        assert_eq!(&segment[moof_size + 4..moof_size + 8], b"mdat");
        assert_eq!(read_u32(&segment, moof_size) as usize, 8 + 20);
        assert_eq!(segment.len(), moof_size + 8 + 20);

        // mfhd sequence number
        assert_eq!(read_u32(&segment, 8 + 12), 7);

        // Each trun data_offset points at its first sample inside the mdat
        let mut trun_offsets = Vec::new();
        for i in 0..moof_size - 4 {
            if &segment[i..i + 4] == b"trun" {
                trun_offsets.push(read_u32(&segment, i + 12) as usize);
            }
        }
        assert_eq!(trun_offsets.len(), 2);
        assert_eq!(segment[trun_offsets[0]], 0xaa);
        assert_eq!(segment[trun_offsets[1]], 0xcc);
    }
}
