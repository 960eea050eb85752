//! Opus access units as carried in MPEG-TS (ETSI TS 102 366 control header)
//! and the `dOps` decoder configuration.

use bytes::Bytes;

/// Every Opus access unit in TS is treated as a 20 ms frame.
pub const FRAME_DURATION_MS: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusConfig {
    pub channel_count: u8,
    /// Raw `channel_config_code` from the Opus extension descriptor.
    pub channel_config_code: u8,
    pub sample_rate: u32,
}

impl OpusConfig {
    /// Builds the configuration announced by the extension descriptor
    /// (tag 0x7F, extension 0x80). Code 0 stands for dual mono as stereo.
    pub fn from_channel_config_code(channel_config_code: u8) -> Self {
        let channels = channel_config_code & 0x0F;
        Self {
            channel_count: if channels == 0 { 2 } else { channels },
            channel_config_code,
            sample_rate: 48000,
        }
    }

    pub fn config_differs(&self, other: &OpusConfig) -> bool {
        self.sample_rate != other.sample_rate || self.channel_count != other.channel_count
    }
}

/// Strips the control headers of a PES payload, yielding the bare Opus
/// packets in order.
pub fn split_access_units(data: &[u8]) -> Vec<Bytes> {
    let mut units = Vec::new();
    let mut offset = 0;
    while offset + 2 < data.len() {
        let start_trim = data[offset + 1] & 0x10 != 0;
        let end_trim = data[offset + 1] & 0x08 != 0;
        let control_extension = data[offset + 1] & 0x04 != 0;

        let mut i = offset + 2;
        let mut size = 0usize;
        while i < data.len() && data[i] == 0xFF {
            size += 255;
            i += 1;
        }
        if i >= data.len() {
            break;
        }
        size += data[i] as usize;
        i += 1;
        if start_trim {
            i += 2;
        }
        if end_trim {
            i += 2;
        }
        if control_extension {
            if i >= data.len() {
                break;
            }
            i += 1 + data[i] as usize;
        }

        let start = i.min(data.len());
        let end = (i + size).min(data.len());
        units.push(Bytes::copy_from_slice(&data[start..end]));
        offset = i + size;
    }
    units
}

/// Body of the `dOps` box (`OpusSpecificBox`) for a channel config code.
pub fn build_dops(config: &OpusConfig) -> Vec<u8> {
    let mapping: &[u8] = match config.channel_config_code {
        1 | 2 => &[0],
        0 => &[255, 1, 1, 0, 1],
        0x80 => &[255, 2, 0, 0, 1],
        3 => &[1, 2, 1, 0, 2, 1],
        4 => &[1, 2, 2, 0, 1, 2, 3],
        5 => &[1, 3, 2, 0, 4, 1, 2, 3],
        6 => &[1, 4, 2, 0, 4, 1, 2, 3, 5],
        7 => &[1, 4, 2, 0, 4, 1, 2, 3, 5, 6],
        8 => &[1, 5, 3, 0, 6, 1, 2, 3, 4, 5, 7],
        0x82 => &[1, 1, 2, 0, 1],
        0x83 => &[1, 1, 3, 0, 1, 2],
        0x84 => &[1, 1, 4, 0, 1, 2, 3],
        0x85 => &[1, 1, 5, 0, 1, 2, 3, 4],
        0x86 => &[1, 1, 6, 0, 1, 2, 3, 4, 5],
        0x87 => &[1, 1, 7, 0, 1, 2, 3, 4, 5, 6],
        0x88 => &[1, 1, 8, 0, 1, 2, 3, 4, 5, 6, 7],
        _ => &[],
    };

    let mut dops = vec![0x00, config.channel_count, 0x00, 0x00];
    dops.extend_from_slice(&config.sample_rate.to_be_bytes());
    dops.extend_from_slice(&[0x00, 0x00]); // output gain
    dops.extend_from_slice(mapping);
    dops
}
