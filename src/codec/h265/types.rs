use crate::codec::{FrameRate, Size};

/// H.265 NAL unit types (ITU-T H.265 Table 7-1) the demuxer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    TrailN,
    TrailR,
    IdrWRadl,
    IdrNLp,
    CraNut,
    Vps,
    Sps,
    Pps,
    Aud,
    PrefixSei,
    SuffixSei,
    Other(u8),
}

impl NalUnitType {
    /// Decodes the type from the first byte of the two-byte NAL header.
    pub fn from_header(byte: u8) -> Self {
        match (byte >> 1) & 0x3F {
            0 => NalUnitType::TrailN,
            1 => NalUnitType::TrailR,
            19 => NalUnitType::IdrWRadl,
            20 => NalUnitType::IdrNLp,
            21 => NalUnitType::CraNut,
            32 => NalUnitType::Vps,
            33 => NalUnitType::Sps,
            34 => NalUnitType::Pps,
            35 => NalUnitType::Aud,
            39 => NalUnitType::PrefixSei,
            40 => NalUnitType::SuffixSei,
            other => NalUnitType::Other(other),
        }
    }

    /// IDR and CRA pictures start a decodable sequence.
    pub fn is_random_access(&self) -> bool {
        matches!(
            self,
            NalUnitType::IdrWRadl | NalUnitType::IdrNLp | NalUnitType::CraNut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VpsInfo {
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
}

/// Sequence parameter set fields, including the profile_tier_level bytes
/// copied verbatim into `hvcC`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpsInfo {
    /// `hvc1.<profile>.1.L<level>.B0`
    pub codec_mimetype: String,
    pub profile_string: String,
    pub level_string: String,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: [u8; 4],
    pub general_constraint_indicator_flags: [u8; 6],
    pub general_level_idc: u8,
    pub min_spatial_segmentation_idc: u32,
    pub constant_frame_rate: u8,
    pub chroma_format_idc: u32,
    pub chroma_format_string: String,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub ref_frames: u32,
    pub frame_rate: FrameRate,
    pub sar_ratio: Size,
    pub codec_size: Size,
    pub present_size: Size,
}

impl SpsInfo {
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth_luma_minus8.saturating_add(8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsInfo {
    /// 0 mixed, 1 slice, 2 tile, 3 wavefront.
    pub parallelism_type: u8,
}
