use super::types::{PpsInfo, SpsInfo, VpsInfo};

/// Builds an `HEVCDecoderConfigurationRecord` carrying one VPS, SPS and PPS.
///
/// The parameter sets are passed as NAL units without start code or length
/// prefix; 4-byte NAL lengths are signalled (`lengthSizeMinusOne = 3`).
pub fn build_hvcc(
    vps: &[u8],
    sps: &[u8],
    pps: &[u8],
    vps_info: &VpsInfo,
    sps_info: &SpsInfo,
    pps_info: &PpsInfo,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(23 + 15 + vps.len() + sps.len() + pps.len());

    out.push(0x01);
    out.push(
        (sps_info.general_profile_space & 0x03) << 6
            | (sps_info.general_tier_flag as u8) << 5
            | (sps_info.general_profile_idc & 0x1F),
    );
    out.extend_from_slice(&sps_info.general_profile_compatibility_flags);
    out.extend_from_slice(&sps_info.general_constraint_indicator_flags);
    out.push(sps_info.general_level_idc);
    let min_spatial = sps_info.min_spatial_segmentation_idc.min(0x0FFF) as u16;
    out.push(0xF0 | (min_spatial >> 8) as u8);
    out.push((min_spatial & 0xFF) as u8);
    out.push(0xFC | (pps_info.parallelism_type & 0x03));
    out.push(0xFC | (sps_info.chroma_format_idc as u8 & 0x03));
    out.push(0xF8 | (sps_info.bit_depth_luma_minus8 & 0x07));
    out.push(0xF8 | (sps_info.bit_depth_chroma_minus8 & 0x07));
    out.extend_from_slice(&[0x00, 0x00]); // avgFrameRate
    out.push(
        (sps_info.constant_frame_rate & 0x03) << 6
            | (vps_info.num_temporal_layers & 0x07) << 3
            | (vps_info.temporal_id_nested as u8) << 2
            | 0x03,
    );
    out.push(0x03); // numOfArrays

    for (nal_type, nal) in [(0xA0u8, vps), (0xA1, sps), (0xA2, pps)] {
        out.push(nal_type); // array_completeness = 1, NAL_unit_type
        out.extend_from_slice(&[0x00, 0x01]);
        out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
        out.extend_from_slice(nal);
    }

    log::debug!("Generated hvcC, {} bytes", out.len());
    out
}
