/// AAC framing (ADTS, LOAS/LATM) and decoder configuration
pub mod aac;
/// AC-3 framing and `dac3`
pub mod ac3;
/// Annex-B start code splitting shared by H.264 and H.265
pub mod annexb;
/// E-AC-3 framing and `dec3`
pub mod eac3;
/// H.264 parameter set parsing and `avcC`
pub mod h264;
/// H.265 parameter set parsing and `hvcC`
pub mod h265;
/// Synchronous KLV metadata access units
pub mod klv;
/// MPEG-1/2 audio frame headers
pub mod mpeg_audio;
/// Opus in TS
pub mod opus;
/// SCTE-35 splice information
pub mod scte35;
/// SMPTE ST 2038 ancillary data
pub mod smpte2038;

/// Frame rate as signalled by the VUI of a parameter set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameRate {
    pub fixed: bool,
    pub fps: f64,
    pub fps_num: u32,
    pub fps_den: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

pub use aac::{AacFrame, AudioSpecificConfig};
pub use ac3::Ac3Frame;
pub use eac3::Eac3Frame;
pub use mpeg_audio::MpegAudioHeader;
pub use opus::OpusConfig;
