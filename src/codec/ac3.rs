//! AC-3 (Dolby Digital) syncframe splitting and `dac3` configuration.

use bytes::Bytes;

/// Words per syncframe, indexed by `[fscod][frmsizecod]`.
const FRAME_SIZE_WORDS: [[u16; 38]; 3] = [
    [
        64, 64, 80, 80, 96, 96, 112, 112, 128, 128, 160, 160, 192, 192, 224, 224, 256, 256, 320,
        320, 384, 384, 448, 448, 512, 512, 640, 640, 768, 768, 896, 896, 1024, 1024, 1152, 1152,
        1280, 1280,
    ],
    [
        69, 70, 87, 88, 104, 105, 121, 122, 139, 140, 174, 175, 208, 209, 243, 244, 278, 279,
        348, 349, 417, 418, 487, 488, 557, 558, 696, 697, 835, 836, 975, 976, 1114, 1115, 1253,
        1254, 1393, 1394,
    ],
    [
        96, 96, 120, 120, 144, 144, 168, 168, 192, 192, 240, 240, 288, 288, 336, 336, 384, 384,
        480, 480, 576, 576, 672, 672, 768, 768, 960, 960, 1152, 1152, 1344, 1344, 1536, 1536, 1728,
        1728, 1920, 1920,
    ],
];

pub(crate) const SAMPLE_RATES: [u32; 3] = [48000, 44100, 32000];

/// Full-bandwidth channels per `acmod`.
pub(crate) const ACMOD_CHANNELS: [u8; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

pub(crate) fn find_syncword(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 7 < data.len() {
        if data[i] == 0x0B && data[i + 1] == 0x77 {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ac3Frame {
    pub sampling_frequency: u32,
    pub sampling_rate_code: u8,
    pub bit_stream_identification: u8,
    pub bit_stream_mode: u8,
    pub channel_mode: u8,
    pub low_frequency_effects_channel_on: u8,
    pub channel_count: u8,
    pub frame_size_code: u8,
    /// The whole syncframe, sync word included.
    pub data: Bytes,
}

impl Ac3Frame {
    pub fn config_differs(&self, other: &Ac3Frame) -> bool {
        self.sampling_frequency != other.sampling_frequency
            || self.bit_stream_identification != other.bit_stream_identification
            || self.channel_mode != other.channel_mode
            || self.low_frequency_effects_channel_on != other.low_frequency_effects_channel_on
    }
}

/// Splits a PES payload into AC-3 syncframes.
pub struct Ac3Parser<'a> {
    data: &'a [u8],
    offset: usize,
    eof: bool,
    has_incomplete_data: bool,
}

impl<'a> Ac3Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let (offset, eof) = match find_syncword(data, 0) {
            Some(offset) => (offset, false),
            None => {
                log::error!("Could not find AC-3 syncword until payload end");
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

    pub fn next_frame(&mut self) -> Option<Ac3Frame> {
        if self.eof {
            return None;
        }
        let data = self.data;
        let s = self.offset;

        let fscod = data[s + 4] >> 6;
        let frmsizecod = data[s + 4] & 0x3F;
        let frame_size = match FRAME_SIZE_WORDS
            .get(fscod as usize)
            .and_then(|sizes| sizes.get(frmsizecod as usize))
        {
            Some(&words) => words as usize * 2,
            None => {
                self.eof = true;
                self.has_incomplete_data = true;
                return None;
            }
        };
        if s + frame_size > data.len() {
            self.eof = true;
            self.has_incomplete_data = true;
            return None;
        }

        match find_syncword(data, s + frame_size) {
            Some(next) => self.offset = next,
            None => {
                self.offset = data.len();
                self.eof = true;
            }
        }

        let bsid = data[s + 5] >> 3;
        let bsmod = data[s + 5] & 0x07;
        let acmod = data[s + 6] >> 5;

        let mut skip = 0;
        if acmod & 0x01 != 0 && acmod != 1 {
            skip += 2; // cmixlev
        }
        if acmod & 0x04 != 0 {
            skip += 2; // surmixlev
        }
        if acmod == 2 {
            skip += 2; // dsurmod
        }
        let word = (data[s + 6] as u16) << 8 | data[s + 7] as u16;
        let lfeon = ((word >> (12 - skip)) & 0x01) as u8;

        Some(Ac3Frame {
            sampling_frequency: SAMPLE_RATES[fscod as usize],
            sampling_rate_code: fscod,
            bit_stream_identification: bsid,
            bit_stream_mode: bsmod,
            channel_mode: acmod,
            low_frequency_effects_channel_on: lfeon,
            channel_count: ACMOD_CHANNELS[acmod as usize] + lfeon,
            frame_size_code: frmsizecod,
            data: Bytes::copy_from_slice(&data[s..s + frame_size]),
        })
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

impl<'a> Iterator for Ac3Parser<'a> {
    type Item = Ac3Frame;

    fn next(&mut self) -> Option<Ac3Frame> {
        self.next_frame()
    }
}

/// Body of the `dac3` box (`AC3SpecificBox`).
pub fn build_dac3(frame: &Ac3Frame) -> Vec<u8> {
    vec![
        frame.sampling_rate_code << 6 | frame.bit_stream_identification << 1 | frame.bit_stream_mode >> 2,
        (frame.bit_stream_mode & 0x03) << 6
            | frame.channel_mode << 3
            | frame.low_frequency_effects_channel_on << 2
            | frame.frame_size_code >> 4,
        (frame.frame_size_code << 4) & 0xE0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// 48 kHz, 192 kbps (frmsizecod 20), bsid 8, 3/2 with LFE.
    fn ac3_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 768];
        frame[0] = 0x0B;
        frame[1] = 0x77;
        frame[4] = 20;
        frame[5] = 8 << 3;
        // acmod 7, cmixlev 00, surmixlev 00, lfeon 1
        frame[6] = 0b1110_0001;
        frame
    }

    #[test]
    fn test_parse_frames() {
        let mut data = ac3_frame();
        data.extend(ac3_frame());

        let frames: Vec<Ac3Frame> = Ac3Parser::new(&data).collect();
        assert_eq!(frames.len(), 2);
        let frame = &frames[0];
        assert_eq!(frame.sampling_frequency, 48000);
        assert_eq!(frame.bit_stream_identification, 8);
        assert_eq!(frame.channel_mode, 7);
        assert_eq!(frame.low_frequency_effects_channel_on, 1);
        assert_eq!(frame.channel_count, 6);
        assert_eq!(frame.data.len(), 768);
    }

    #[test]
    fn test_incomplete_trailing_frame() {
        let mut data = ac3_frame();
        data.extend_from_slice(&ac3_frame()[..100]);

        let mut parser = Ac3Parser::new(&data);
        assert!(parser.next_frame().is_some());
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.incomplete_data().unwrap().len(), 100);
    }

    #[test]
    fn test_dac3() {
        let frame = Ac3Parser::new(&ac3_frame()).next_frame().unwrap();
        // fscod 0, bsid 8, bsmod 0 | acmod 7, lfeon 1, frmsizecod 20
        assert_eq!(build_dac3(&frame), vec![0x10, 0x3D, 0x40]);
    }
}
