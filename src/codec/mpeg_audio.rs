//! MPEG-1/2/2.5 audio (Layer I, II, III) frame header decoding.

use crate::{RemuxError, Result};

const RATES_V1: [u32; 4] = [44100, 48000, 32000, 0];
const RATES_V2: [u32; 4] = [22050, 24000, 16000, 0];
const RATES_V25: [u32; 4] = [11025, 12000, 8000, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegAudioHeader {
    pub version: MpegVersion,
    /// 1, 2 or 3; 0 for the reserved layer code.
    pub layer: u8,
    /// MP4 object type: 32 (Layer I), 33 (Layer II) or 34 (Layer III).
    pub object_type: u8,
    pub sample_rate: u32,
    pub channel_count: u8,
}

impl MpegAudioHeader {
    pub fn is_layer2(&self) -> bool {
        self.object_type == 33
    }

    /// PCM samples carried by one frame.
    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (1, _) => 384,
            (3, MpegVersion::Mpeg2 | MpegVersion::Mpeg25) => 576,
            _ => 1152,
        }
    }

    pub fn config_differs(&self, other: &MpegAudioHeader) -> bool {
        self.object_type != other.object_type
            || self.sample_rate != other.sample_rate
            || self.channel_count != other.channel_count
    }
}

/// Decodes the 4-byte header at the start of `data`.
pub fn parse_header(data: &[u8]) -> Result<MpegAudioHeader> {
    if data.len() < 4 {
        return Err(RemuxError::Parser("MPEG audio header too short".into()));
    }

    let version_bits = (data[1] >> 3) & 0x03;
    let layer_bits = (data[1] & 0x06) >> 1;
    let sampling_index = ((data[2] & 0x0C) >> 2) as usize;
    let channel_mode = (data[3] >> 6) & 0x03;

    let (version, sample_rate) = match version_bits {
        0 => (MpegVersion::Mpeg25, RATES_V25[sampling_index]),
        2 => (MpegVersion::Mpeg2, RATES_V2[sampling_index]),
        3 => (MpegVersion::Mpeg1, RATES_V1[sampling_index]),
        _ => (MpegVersion::Reserved, 0),
    };
    let (layer, object_type) = match layer_bits {
        1 => (3, 34),
        2 => (2, 33),
        3 => (1, 32),
        _ => (0, 34),
    };

    Ok(MpegAudioHeader {
        version,
        layer,
        object_type,
        sample_rate,
        channel_count: if channel_mode == 3 { 1 } else { 2 },
    })
}
