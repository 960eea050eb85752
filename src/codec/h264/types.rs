use crate::codec::{FrameRate, Size};

/// NAL unit types the demuxer acts on. Everything else is carried through
/// as opaque slice data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    Unspecified = 0,
    CodedSliceNonIdr = 1,
    CodedSliceDataPartitionA = 2,
    CodedSliceDataPartitionB = 3,
    CodedSliceDataPartitionC = 4,
    CodedSliceIdr = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    AccessUnitDelimiter = 9,
    EndOfSequence = 10,
    EndOfStream = 11,
    FillerData = 12,
    SpsExtension = 13,
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NalUnitType::CodedSliceNonIdr,
            2 => NalUnitType::CodedSliceDataPartitionA,
            3 => NalUnitType::CodedSliceDataPartitionB,
            4 => NalUnitType::CodedSliceDataPartitionC,
            5 => NalUnitType::CodedSliceIdr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            13 => NalUnitType::SpsExtension,
            _ => NalUnitType::Unspecified,
        }
    }
}

/// Fields decoded from a sequence parameter set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpsInfo {
    /// `avc1.PPCCLL` built from the three bytes following the NAL header.
    pub codec_mimetype: String,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub profile_string: String,
    pub level_string: String,
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub ref_frames: u32,
    /// 420, 422 or 444.
    pub chroma_format: u32,
    pub chroma_format_string: String,
    pub frame_rate: FrameRate,
    pub sar_ratio: Size,
    pub codec_size: Size,
    pub present_size: Size,
}

impl SpsInfo {
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth_luma
    }
}
