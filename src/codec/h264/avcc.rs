use super::types::SpsInfo;

/// Builds an `AVCDecoderConfigurationRecord` from one SPS and one PPS.
///
/// Both NAL units are passed without start code or length prefix. Profiles
/// other than Baseline, Main and Extended get the chroma/bit-depth
/// extension bytes.
pub fn build_avcc(sps: &[u8], pps: &[u8], info: &SpsInfo) -> Vec<u8> {
    let extended = !matches!(info.profile_idc, 66 | 77 | 88);
    let mut out = Vec::with_capacity(11 + sps.len() + pps.len() + if extended { 4 } else { 0 });

    out.push(0x01); // configurationVersion
    out.extend_from_slice(sps.get(1..4).unwrap_or(&[0, 0, 0]));
    out.push(0xFF); // lengthSizeMinusOne = 3
    out.push(0xE1); // numOfSequenceParameterSets = 1
    out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    out.extend_from_slice(sps);
    out.push(0x01); // numOfPictureParameterSets
    out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    out.extend_from_slice(pps);

    if extended {
        out.push(0xFC | (info.chroma_format_idc as u8 & 0x03));
        out.push(0xF8 | (info.bit_depth_luma.saturating_sub(8) & 0x07));
        out.push(0xF8 | (info.bit_depth_chroma.saturating_sub(8) & 0x07));
        out.push(0x00); // numOfSequenceParameterSetExt
    }

    log::debug!("Generated avcC, {} bytes, extended: {}", out.len(), extended);
    out
}
