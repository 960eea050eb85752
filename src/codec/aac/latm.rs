use bytes::Bytes;

use super::types::{sampling_frequency, AacFrame};
use crate::utils::BitReader;
use crate::{RemuxError, Result};

/// Splits a PES payload into LOAS `AudioSyncStream` frames (11-bit sync
/// word `0x2B7`) and decodes one `AudioMuxElement` from each.
///
/// Only the single program / single layer / single subframe layout with
/// `frameLengthType = 0` is supported. Frames that reuse the previous
/// `StreamMuxConfig` are resolved against the frame passed to
/// [`LoasParser::next_frame`].
pub struct LoasParser<'a> {
    data: &'a [u8],
    offset: usize,
    eof: bool,
    has_incomplete_data: bool,
}

impl<'a> LoasParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut parser = Self {
            data,
            offset: 0,
            eof: false,
            has_incomplete_data: false,
        };
        parser.offset = parser.find_next_syncword(0);
        if parser.eof {
            log::error!("Could not find LOAS syncword until payload end");
        }
        parser
    }

    fn find_next_syncword(&mut self, from: usize) -> usize {
        let data = self.data;
        let mut i = from;
        loop {
            if i + 1 >= data.len() {
                self.eof = true;
                return data.len();
            }
            if data[i] == 0x56 && data[i + 1] & 0xE0 == 0xE0 {
                return i;
            }
            i += 1;
        }
    }

    /// Returns the next frame, or an error for a mux layout this parser
    /// does not handle. After an error the parser resumes at the next sync
    /// word on the following call.
    pub fn next_frame(&mut self, previous: Option<&AacFrame>) -> Option<Result<AacFrame>> {
        while !self.eof {
            let offset = self.offset;
            if offset + 2 >= self.data.len() {
                self.eof = true;
                self.has_incomplete_data = true;
                break;
            }
            let mux_length = (((self.data[offset + 1] & 0x1F) as usize) << 8) | self.data[offset + 2] as usize;
            let end = offset + 3 + mux_length;
            if end >= self.data.len() {
                self.eof = true;
                self.has_incomplete_data = true;
                break;
            }

            let element = &self.data[offset + 3..end];
            self.offset = self.find_next_syncword(end);

            match parse_audio_mux_element(element, previous) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {
                    log::warn!("StreamMuxConfig missing, skipping LOAS frame");
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
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

fn latm_value(reader: &mut BitReader) -> Result<u32> {
    let bytes_for_value = reader.read_bits(2)?;
    let mut value = 0u32;
    for _ in 0..=bytes_for_value {
        value = (value << 8) | reader.read_byte()? as u32;
    }
    Ok(value)
}

/// Decodes `AudioMuxElement(muxConfigPresent = 1)`.
///
/// Returns `Ok(None)` when the element reuses a configuration that was never
/// seen.
fn parse_audio_mux_element(element: &[u8], previous: Option<&AacFrame>) -> Result<Option<AacFrame>> {
    let mut reader = BitReader::new(element);

    let use_same_stream_mux = reader.read_bool()?;
    let config = if !use_same_stream_mux {
        parse_stream_mux_config(&mut reader)?
    } else {
        match previous {
            Some(previous) => StreamMuxConfig {
                audio_object_type: previous.audio_object_type,
                sampling_freq_index: previous.sampling_freq_index,
                channel_config: previous.channel_config,
                other_data_present: previous.other_data_present,
            },
            None => return Ok(None),
        }
    };

    // PayloadLengthInfo
    let mut length = 0usize;
    loop {
        let tmp = reader.read_byte()?;
        length += tmp as usize;
        if tmp != 0xFF {
            break;
        }
    }
    let mut payload = Vec::with_capacity(length);
    for _ in 0..length {
        payload.push(reader.read_byte()?);
    }

    let sampling_frequency = sampling_frequency(config.sampling_freq_index).ok_or_else(|| {
        RemuxError::InvalidData(format!(
            "LOAS reserved sampling frequency index {}",
            config.sampling_freq_index
        ))
    })?;

    Ok(Some(AacFrame {
        audio_object_type: config.audio_object_type,
        sampling_freq_index: config.sampling_freq_index,
        sampling_frequency,
        channel_config: config.channel_config,
        other_data_present: config.other_data_present,
        data: Bytes::from(payload),
    }))
}

struct StreamMuxConfig {
    audio_object_type: u8,
    sampling_freq_index: u8,
    channel_config: u8,
    other_data_present: bool,
}

fn parse_stream_mux_config(reader: &mut BitReader) -> Result<StreamMuxConfig> {
    let audio_mux_version = reader.read_bool()?;
    if audio_mux_version && reader.read_bool()? {
        return Err(RemuxError::Unsupported("audioMuxVersionA is not supported".into()));
    }
    if audio_mux_version {
        latm_value(reader)?; // taraBufferFullness
    }
    if !reader.read_bool()? {
        return Err(RemuxError::Unsupported(
            "allStreamsSameTimeFraming = 0 is not supported".into(),
        ));
    }
    if reader.read_bits(6)? != 0 {
        return Err(RemuxError::Unsupported("numSubFrames > 0 is not supported".into()));
    }
    if reader.read_bits(4)? != 0 {
        return Err(RemuxError::Unsupported("numProgram > 0 is not supported".into()));
    }
    if reader.read_bits(3)? != 0 {
        return Err(RemuxError::Unsupported("numLayer > 0 is not supported".into()));
    }

    let mut fill_bits = if audio_mux_version {
        latm_value(reader)? as i64
    } else {
        0
    };
    let audio_object_type = reader.read_bits(5)? as u8;
    let sampling_freq_index = reader.read_bits(4)? as u8;
    let channel_config = reader.read_bits(4)? as u8;
    reader.skip_bits(3)?; // GASpecificConfig
    fill_bits -= 16;
    if fill_bits > 0 {
        reader.skip_bits(fill_bits as u32)?;
    }

    let frame_length_type = reader.read_bits(3)?;
    if frame_length_type != 0 {
        return Err(RemuxError::Unsupported(format!(
            "frameLengthType = {} is not supported",
            frame_length_type
        )));
    }
    reader.skip_bits(8)?; // latmBufferFullness

    let other_data_present = reader.read_bool()?;
    if other_data_present {
        if audio_mux_version {
            latm_value(reader)?;
        } else {
            loop {
                let escape = reader.read_bool()?;
                reader.skip_bits(8)?;
                if !escape {
                    break;
                }
            }
        }
    }

    if reader.read_bool()? {
        reader.skip_bits(8)?; // crcCheckSum
    }

    Ok(StreamMuxConfig {
        audio_object_type,
        sampling_freq_index,
        channel_config,
        other_data_present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bits::test_utils::BitWriter;
    use pretty_assertions::assert_eq;

    fn loas_frame(element: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0x56,
            0xE0 | ((element.len() >> 8) & 0x1F) as u8,
            (element.len() & 0xFF) as u8,
        ];
        frame.extend_from_slice(element);
        frame
    }

    fn element_with_config(payload: &[u8]) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.flag(false); // useSameStreamMux
        w.flag(false); // audioMuxVersion
        w.flag(true); // allStreamsSameTimeFraming
        w.bits(6, 0).bits(4, 0).bits(3, 0);
        w.bits(5, 2).bits(4, 3).bits(4, 2).bits(3, 0); // AAC-LC, 48 kHz, stereo
        w.bits(3, 0).bits(8, 0xFF); // frameLengthType, latmBufferFullness
        w.flag(false).flag(false); // otherDataPresent, crcCheckPresent
        w.bits(8, payload.len() as u64);
        for &b in payload {
            w.bits(8, b as u64);
        }
        w.into_bytes()
    }

    fn element_same_config(payload: &[u8]) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.flag(true);
        w.bits(8, payload.len() as u64);
        for &b in payload {
            w.bits(8, b as u64);
        }
        w.into_bytes()
    }

    #[test]
    fn test_stream_mux_config_then_reuse() {
        let mut data = loas_frame(&element_with_config(&[0xAA, 0xBB, 0xCC]));
        data.extend(loas_frame(&element_same_config(&[0x11, 0x22])));
        data.push(0x00);

        let mut parser = LoasParser::new(&data);
        let first = parser.next_frame(None).unwrap().unwrap();
        assert_eq!(first.audio_object_type, 2);
        assert_eq!(first.sampling_frequency, 48000);
        assert_eq!(first.channel_config, 2);
        assert_eq!(first.data.as_ref(), &[0xAA, 0xBB, 0xCC]);

        let second = parser.next_frame(Some(&first)).unwrap().unwrap();
        assert!(!second.config_differs(&first));
        assert_eq!(second.data.as_ref(), &[0x11, 0x22]);
        assert!(parser.next_frame(Some(&second)).is_none());
    }

    #[test]
    fn test_missing_stream_mux_config_is_skipped() {
        let mut data = loas_frame(&element_same_config(&[0x11]));
        data.push(0x00);
        let mut parser = LoasParser::new(&data);
        assert!(parser.next_frame(None).is_none());
    }

    #[test]
    fn test_unsupported_layout() {
        let mut w = BitWriter::new();
        w.flag(false).flag(false).flag(false); // allStreamsSameTimeFraming = 0
        w.bits(16, 0);
        let mut data = loas_frame(&w.into_bytes());
        data.push(0x00);

        let mut parser = LoasParser::new(&data);
        match parser.next_frame(None) {
            Some(Err(RemuxError::Unsupported(_))) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_frame() {
        let frame = loas_frame(&element_with_config(&[0x01; 10]));
        let mut parser = LoasParser::new(&frame[..8]);
        assert!(parser.next_frame(None).is_none());
        assert_eq!(parser.incomplete_data().unwrap(), &frame[..8]);
    }
}
