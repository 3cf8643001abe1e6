//! H.264 packaging helpers: Annex B start codes vs. AVCC length prefixes.

use crate::control::ControlError;

const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

/// Whether `data` begins with an Annex B start code
pub fn is_annex_b(data: &[u8]) -> bool {
    data.starts_with(&[0x00, 0x00, 0x01]) || data.starts_with(&[0x00, 0x00, 0x00, 0x01])
}

fn start_code_len(data: &[u8], i: usize) -> Option<usize> {
    if data[i..].starts_with(&[0x00, 0x00, 0x00, 0x01]) {
        Some(4)
    } else if data[i..].starts_with(&[0x00, 0x00, 0x01]) {
        Some(3)
    } else {
        None
    }
}

/// Split Annex B data into NAL units (start codes removed)
pub fn split_annex_b(annex_b: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut i = 0;

    while i < annex_b.len() {
        let Some(sc_len) = start_code_len(annex_b, i) else {
            i += 1;
            continue;
        };
        let nal_start = i + sc_len;

        let mut nal_end = (nal_start..annex_b.len())
            .find(|&j| start_code_len(annex_b, j).is_some())
            .unwrap_or(annex_b.len());
        let next = nal_end;

        // Trailing zeros belong to the next start code
        while nal_end > nal_start && annex_b[nal_end - 1] == 0x00 {
            nal_end -= 1;
        }
        if nal_end > nal_start {
            nals.push(&annex_b[nal_start..nal_end]);
        }

        i = next;
    }

    nals
}

/// Convert Annex B format (start code prefixed) to AVCC format (4-byte length prefixed)
pub fn annex_b_to_avcc(annex_b: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(annex_b.len() + 4);
    for nal in split_annex_b(annex_b) {
        result.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        result.extend_from_slice(nal);
    }
    result
}

/// Extract the first SPS and PPS from an AVCDecoderConfigurationRecord
///
/// Record layout:
/// - 1 byte: configurationVersion (always 1)
/// - 3 bytes: profile, profile_compatibility, level
/// - 1 byte: lengthSizeMinusOne
/// - 1 byte: numOfSequenceParameterSets (lower 5 bits), then 2-byte length + SPS each
/// - 1 byte: numOfPictureParameterSets, then 2-byte length + PPS each
pub fn extract_sps_pps(avcc: &[u8]) -> Result<(&[u8], &[u8]), ControlError> {
    let invalid = |msg: &str| ControlError::InvalidCodecConfig(msg.to_string());

    if avcc.len() < 7 {
        return Err(invalid("avcC too short"));
    }
    if avcc[0] != 1 {
        return Err(ControlError::InvalidCodecConfig(format!(
            "invalid avcC version: {}",
            avcc[0]
        )));
    }

    let mut offset = 5;
    let num_sps = avcc[offset] & 0x1F;
    offset += 1;
    if num_sps == 0 {
        return Err(invalid("no SPS in avcC"));
    }
    let sps = read_parameter_set(avcc, &mut offset)?;
    for _ in 1..num_sps {
        read_parameter_set(avcc, &mut offset)?;
    }

    let num_pps = *avcc
        .get(offset)
        .ok_or_else(|| invalid("avcC truncated at PPS count"))?;
    offset += 1;
    if num_pps == 0 {
        return Err(invalid("no PPS in avcC"));
    }
    let pps = read_parameter_set(avcc, &mut offset)?;

    Ok((sps, pps))
}

fn read_parameter_set<'a>(avcc: &'a [u8], offset: &mut usize) -> Result<&'a [u8], ControlError> {
    let truncated = || ControlError::InvalidCodecConfig("avcC truncated at parameter set".into());

    let len_bytes = avcc.get(*offset..*offset + 2).ok_or_else(truncated)?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    *offset += 2;
    let set = avcc.get(*offset..*offset + len).ok_or_else(truncated)?;
    *offset += len;
    Ok(set)
}

/// Build an AVCDecoderConfigurationRecord from one SPS and one PPS
pub fn build_avcc_record(sps: &[u8], pps: &[u8]) -> Vec<u8> {
    let mut record = vec![
        1,                                   // Configuration version
        sps.get(1).copied().unwrap_or(0x42), // Profile
        sps.get(2).copied().unwrap_or(0x00), // Profile compatibility
        sps.get(3).copied().unwrap_or(0x1e), // Level
        0xff, // 6 bits reserved + 2 bits NAL unit length - 1 (3 = 4 bytes)
        0xe1, // 3 bits reserved + 5 bits number of SPS
    ];
    record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    record.extend_from_slice(sps);
    record.push(1); // Number of PPS
    record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    record.extend_from_slice(pps);
    record
}

/// Turn an AVC codec config frame into an avcC payload.
///
/// Accepts either a ready AVCDecoderConfigurationRecord or Annex B SPS/PPS.
pub fn decoder_config_record(csd: &[u8]) -> Result<Vec<u8>, ControlError> {
    if is_annex_b(csd) {
        let nals = split_annex_b(csd);
        let find = |nal_type: u8| nals.iter().find(|nal| nal[0] & 0x1F == nal_type).copied();
        let sps = find(NAL_TYPE_SPS)
            .ok_or_else(|| ControlError::InvalidCodecConfig("no SPS in codec config".into()))?;
        let pps = find(NAL_TYPE_PPS)
            .ok_or_else(|| ControlError::InvalidCodecConfig("no PPS in codec config".into()))?;
        return Ok(build_avcc_record(sps, pps));
    }

    extract_sps_pps(csd)?;
    Ok(csd.to_vec())
}
