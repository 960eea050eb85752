use bytes::Bytes;

use super::types::{sampling_frequency, AacFrame, AdtsHeader};
use crate::utils::BitReader;
use crate::{RemuxError, Result};

/// Decodes the fixed and variable ADTS header fields at the start of `data`.
pub fn parse_adts_header(data: &[u8]) -> Result<AdtsHeader> {
    if data.len() < 7 {
        return Err(RemuxError::Parser("ADTS header too short".into()));
    }

    let mut reader = BitReader::new(data);

    let sync_word = reader.read_bits(12)?;
    if sync_word != 0xFFF {
        return Err(RemuxError::Parser("Invalid ADTS sync word".into()));
    }

    let id = reader.read_bits(1)? as u8;
    let layer = reader.read_bits(2)? as u8;
    let protection_absent = reader.read_bool()?;
    let profile = reader.read_bits(2)? as u8;
    let sample_rate_index = reader.read_bits(4)? as u8;
    reader.skip_bits(1)?; // private_bit
    let channel_configuration = reader.read_bits(3)? as u8;
    reader.skip_bits(4)?; // original_copy, home, copyright id bit/start
    let frame_length = reader.read_bits(13)? as u16;
    reader.skip_bits(11)?; // adts_buffer_fullness
    let number_of_raw_blocks = reader.read_bits(2)? as u8;

    Ok(AdtsHeader {
        sync_word,
        id,
        layer,
        protection_absent,
        profile,
        sample_rate_index,
        channel_configuration,
        frame_length,
        number_of_raw_blocks,
    })
}

/// Splits a PES payload into ADTS frames.
///
/// A frame that runs past the end of the buffer stops the parser; its bytes
/// are available from [`AdtsParser::incomplete_data`] so the caller can
/// prepend them to the next payload.
pub struct AdtsParser<'a> {
    data: &'a [u8],
    offset: usize,
    eof: bool,
    has_incomplete_data: bool,
}

impl<'a> AdtsParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut parser = Self {
            data,
            offset: 0,
            eof: false,
            has_incomplete_data: false,
        };
        parser.offset = parser.find_next_syncword(0);
        if parser.eof {
            log::error!("Could not find ADTS syncword until payload end");
        }
        parser
    }

    fn find_next_syncword(&mut self, from: usize) -> usize {
        let data = self.data;
        let mut i = from;
        loop {
            if i + 7 >= data.len() {
                self.eof = true;
                return data.len();
            }
            if data[i] == 0xFF && data[i + 1] & 0xF0 == 0xF0 {
                return i;
            }
            i += 1;
        }
    }

    pub fn next_frame(&mut self) -> Option<AacFrame> {
        while !self.eof {
            let offset = self.offset;
            let header = match parse_adts_header(&self.data[offset..]) {
                Ok(header) => header,
                Err(_) => {
                    self.offset = self.find_next_syncword(offset + 1);
                    continue;
                }
            };

            let frame_length = header.frame_length as usize;
            if offset + frame_length > self.data.len() {
                self.eof = true;
                self.has_incomplete_data = true;
                break;
            }

            let header_length = header.header_length();
            if frame_length < header_length {
                self.offset = self.find_next_syncword(offset + 1);
                continue;
            }
            let payload_start = offset + header_length;
            let payload_end = offset + frame_length;
            self.offset = self.find_next_syncword(payload_end);

            if header.layer != 0 {
                continue;
            }
            let Some(sampling_frequency) = sampling_frequency(header.sample_rate_index) else {
                log::warn!(
                    "ADTS frame with reserved sampling frequency index {}",
                    header.sample_rate_index
                );
                continue;
            };

            return Some(AacFrame {
                audio_object_type: header.profile + 1,
                sampling_freq_index: header.sample_rate_index,
                sampling_frequency,
                channel_config: header.channel_configuration,
                other_data_present: false,
                data: Bytes::copy_from_slice(&self.data[payload_start..payload_end]),
            });
        }
        None
    }

    pub fn has_incomplete_data(&self) -> bool {
        self.has_incomplete_data
    }

    /// Bytes of the truncated trailing frame, if any.
    pub fn incomplete_data(&self) -> Option<&'a [u8]> {
        if self.has_incomplete_data {
            Some(&self.data[self.offset..])
        } else {
            None
        }
    }
}

impl<'a> Iterator for AdtsParser<'a> {
    type Item = AacFrame;

    fn next(&mut self) -> Option<AacFrame> {
        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// AAC-LC, 44.1 kHz, stereo, no CRC.
    fn adts_frame(payload: &[u8]) -> Vec<u8> {
        let frame_length = payload.len() + 7;
        let mut frame = vec![
            0xFF,
            0xF1,
            (1 << 6) | (4 << 2),
            (2 << 6) | ((frame_length >> 11) & 0x03) as u8,
            ((frame_length >> 3) & 0xFF) as u8,
            (((frame_length & 0x07) << 5) as u8) | 0x1F,
            0xFC,
        ];
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_parse_adts_header() {
        let frame = adts_frame(&[0x21, 0x10, 0x04]);
        let header = parse_adts_header(&frame).unwrap();

        assert_eq!(header.sync_word, 0xFFF);
        assert_eq!(header.id, 0);
        assert_eq!(header.layer, 0);
        assert!(header.protection_absent);
        assert_eq!(header.profile, 1);
        assert_eq!(header.sample_rate(), Some(44100));
        assert_eq!(header.channel_configuration, 2);
        assert_eq!(header.frame_length, 10);
        assert_eq!(header.number_of_raw_blocks, 0);
    }

    #[test]
    fn test_invalid_header() {
        assert!(parse_adts_header(&[0xFF, 0xF1, 0x50]).is_err());
        assert!(parse_adts_header(&[0x00; 7]).is_err());
    }

    #[test]
    fn test_split_frames_and_carry_remainder() {
        let mut data = adts_frame(&[0x01; 12]);
        data.extend(adts_frame(&[0x02; 20]));
        let third = adts_frame(&[0x03; 30]);
        data.extend_from_slice(&third[..15]);

        let mut parser = AdtsParser::new(&data);
        let first = parser.next_frame().unwrap();
        assert_eq!(first.audio_object_type, 2);
        assert_eq!(first.sampling_frequency, 44100);
        assert_eq!(first.channel_config, 2);
        assert_eq!(first.data.as_ref(), &[0x01; 12]);

        let second = parser.next_frame().unwrap();
        assert_eq!(second.data.len(), 20);

        assert!(parser.next_frame().is_none());
        assert!(parser.has_incomplete_data());
        assert_eq!(parser.incomplete_data().unwrap(), &third[..15]);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut data = vec![0x00, 0x12, 0x34];
        data.extend(adts_frame(&[0x05; 8]));
        let frames: Vec<AacFrame> = AdtsParser::new(&data).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), &[0x05; 8]);
    }
}
