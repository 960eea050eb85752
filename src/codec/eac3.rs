//! E-AC-3 (Dolby Digital Plus) syncframe splitting and `dec3` configuration.

use bytes::Bytes;

use super::ac3::{find_syncword, ACMOD_CHANNELS, SAMPLE_RATES};
use crate::utils::BitReader;

const REDUCED_SAMPLE_RATES: [u32; 3] = [24000, 22050, 16000];
const NUM_BLOCKS: [u8; 4] = [1, 2, 3, 6];

#[derive(Debug, Clone, PartialEq)]
pub struct Eac3Frame {
    pub sampling_frequency: u32,
    pub sampling_rate_code: u8,
    pub bit_stream_identification: u8,
    pub channel_mode: u8,
    pub low_frequency_effects_channel_on: u8,
    pub channel_count: u8,
    /// Audio blocks per syncframe (1, 2, 3 or 6), 256 samples each.
    pub num_blks: u8,
    /// Syncframe size in bytes.
    pub frame_size: usize,
    pub data: Bytes,
}

impl Eac3Frame {
    pub fn config_differs(&self, other: &Eac3Frame) -> bool {
        self.sampling_frequency != other.sampling_frequency
            || self.bit_stream_identification != other.bit_stream_identification
            || self.channel_mode != other.channel_mode
            || self.low_frequency_effects_channel_on != other.low_frequency_effects_channel_on
    }
}

struct SyncInfo {
    frame_size: usize,
    fscod: u8,
    sampling_frequency: u32,
    numblkscod: u8,
    acmod: u8,
    lfeon: u8,
    bsid: u8,
}

fn parse_bsi(data: &[u8]) -> crate::Result<SyncInfo> {
    let mut reader = BitReader::new(data);
    reader.skip_bits(2)?; // strmtyp
    reader.skip_bits(3)?; // substreamid
    let frame_size = (reader.read_bits(11)? as usize + 1) << 1;
    let mut fscod = reader.read_bits(2)? as u8;
    let (sampling_frequency, numblkscod) = if fscod == 3 {
        fscod = reader.read_bits(2)? as u8; // fscod2
        let rate = REDUCED_SAMPLE_RATES.get(fscod as usize).copied().unwrap_or(0);
        (rate, 3)
    } else {
        (SAMPLE_RATES[fscod as usize], reader.read_bits(2)? as u8)
    };
    let acmod = reader.read_bits(3)? as u8;
    let lfeon = reader.read_bits(1)? as u8;
    let bsid = reader.read_bits(5)? as u8;
    Ok(SyncInfo {
        frame_size,
        fscod,
        sampling_frequency,
        numblkscod,
        acmod,
        lfeon,
        bsid,
    })
}

/// Splits a PES payload into E-AC-3 syncframes.
pub struct Eac3Parser<'a> {
    data: &'a [u8],
    offset: usize,
    eof: bool,
    has_incomplete_data: bool,
}

impl<'a> Eac3Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let (offset, eof) = match find_syncword(data, 0) {
            Some(offset) => (offset, false),
            None => {
                log::error!("Could not find E-AC-3 syncword until payload end");
                (data.len(), true)
            }
        };
        Self {
            data,
            offset,
            eof,
            has_incomplete_data: false,
        }
    }

    pub fn next_frame(&mut self) -> Option<Eac3Frame> {
        while !self.eof {
            let data = self.data;
            let s = self.offset;
            let info = match parse_bsi(&data[s + 2..]) {
                Ok(info) => info,
                Err(_) => {
                    self.eof = true;
                    self.has_incomplete_data = true;
                    return None;
                }
            };
            if s + info.frame_size > data.len() {
                self.eof = true;
                self.has_incomplete_data = true;
                return None;
            }

            match find_syncword(data, s + info.frame_size) {
                Some(next) => self.offset = next,
                None => {
                    self.offset = data.len();
                    self.eof = true;
                }
            }
            if info.sampling_frequency == 0 {
                log::warn!("E-AC-3 frame with reserved fscod2, skipped");
                continue;
            }

            return Some(Eac3Frame {
                sampling_frequency: info.sampling_frequency,
                sampling_rate_code: info.fscod,
                bit_stream_identification: info.bsid,
                channel_mode: info.acmod,
                low_frequency_effects_channel_on: info.lfeon,
                channel_count: ACMOD_CHANNELS[info.acmod as usize] + info.lfeon,
                num_blks: NUM_BLOCKS[info.numblkscod as usize],
                frame_size: info.frame_size,
                data: Bytes::copy_from_slice(&data[s..s + info.frame_size]),
            });
        }
        None
    }

    pub fn has_incomplete_data(&self) -> bool {
        self.has_incomplete_data
    }

    pub fn incomplete_data(&self) -> Option<&'a [u8]> {
        if self.has_incomplete_data {
            Some(&self.data[self.offset..])
        } else {
            None
        }
    }
}

impl<'a> Iterator for Eac3Parser<'a> {
    type Item = Eac3Frame;

    fn next(&mut self) -> Option<Eac3Frame> {
        self.next_frame()
    }
}

/// Body of the `dec3` box (`EC3SpecificBox`) for a single independent
/// substream without dependent substreams.
pub fn build_dec3(frame: &Eac3Frame) -> Vec<u8> {
    let samples = frame.num_blks as u64 * 256;
    let data_rate = if samples > 0 {
        (frame.frame_size as u64 * 8 * frame.sampling_frequency as u64 / samples / 1000) as u16
    } else {
        0
    };
    let data_rate = data_rate.min(0x1FFF);
    vec![
        (data_rate >> 5) as u8,
        ((data_rate & 0x1F) as u8) << 3, // num_ind_sub = 0
        frame.sampling_rate_code << 6 | (frame.bit_stream_identification & 0x1F) << 1,
        frame.channel_mode << 1 | frame.low_frequency_effects_channel_on,
        0x00, // num_dep_sub = 0
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bits::test_utils::BitWriter;
    use pretty_assertions::assert_eq;

    /// 48 kHz, 6 blocks, 2/0 without LFE, bsid 16, 1536-byte frames.
    fn eac3_frame() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.bits(16, 0x0B77);
        w.bits(2, 0).bits(3, 0).bits(11, 767); // strmtyp, substreamid, frmsiz
        w.bits(2, 0).bits(2, 3); // fscod, numblkscod
        w.bits(3, 2).bits(1, 0).bits(5, 16); // acmod, lfeon, bsid
        let mut frame = w.into_bytes();
        frame.resize(1536, 0);
        frame
    }

    #[test]
    fn test_parse_frames() {
        let mut data = eac3_frame();
        data.extend(eac3_frame());

        let frames: Vec<Eac3Frame> = Eac3Parser::new(&data).collect();
        assert_eq!(frames.len(), 2);
        let frame = &frames[0];
        assert_eq!(frame.sampling_frequency, 48000);
        assert_eq!(frame.num_blks, 6);
        assert_eq!(frame.channel_mode, 2);
        assert_eq!(frame.channel_count, 2);
        assert_eq!(frame.bit_stream_identification, 16);
        assert_eq!(frame.frame_size, 1536);
    }

    #[test]
    fn test_dec3() {
        let frame = Eac3Parser::new(&eac3_frame()).next_frame().unwrap();
        // 1536 bytes per 1536 samples at 48 kHz = 384 kbps
        assert_eq!(build_dec3(&frame), vec![0x0C, 0x00, 0x20, 0x04, 0x00]);
    }

    #[test]
    fn test_incomplete_trailing_frame() {
        let mut data = eac3_frame();
        data.extend_from_slice(&eac3_frame()[..64]);
        let mut parser = Eac3Parser::new(&data);
        assert!(parser.next_frame().is_some());
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.incomplete_data().unwrap().len(), 64);
    }
}
