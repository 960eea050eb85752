//! Annex-B byte stream splitting shared by the H.264 and H.265 parsers.

/// Iterates over the NAL units of an Annex-B payload.
///
/// Each item is the NAL unit with its header, without the start code. A unit
/// runs up to the next `00 00 01` / `00 00 00 01` start code or the end of
/// the buffer.
#[derive(Debug)]
pub struct AnnexBReader<'a> {
    data: &'a [u8],
    offset: usize,
    eof: bool,
}

impl<'a> AnnexBReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut reader = Self {
            data,
            offset: 0,
            eof: false,
        };
        reader.offset = reader.find_next_start_code(0);
        if reader.eof {
            log::error!("Could not find Annex-B start code until payload end");
        }
        reader
    }

    fn find_next_start_code(&mut self, from: usize) -> usize {
        let data = self.data;
        let mut i = from;
        loop {
            if i + 3 >= data.len() {
                self.eof = true;
                return data.len();
            }
            if data[i] == 0 && data[i + 1] == 0 && (data[i + 2] == 1 || (data[i + 2] == 0 && data[i + 3] == 1)) {
                return i;
            }
            i += 1;
        }
    }
}

impl<'a> Iterator for AnnexBReader<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while !self.eof {
            let data = self.data;
            let mut start = self.offset;
            start += if data[start + 2] == 0 { 4 } else { 3 };
            let end = self.find_next_start_code(start);
            self.offset = end;
            if start < end {
                return Some(&data[start..end]);
            }
        }
        None
    }
}

/// Removes emulation prevention bytes (`00 00 03` becomes `00 00`).
pub fn ebsp_to_rbsp(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len());
    for (i, &byte) in src.iter().enumerate() {
        if i >= 2 && byte == 0x03 && src[i - 1] == 0x00 && src[i - 2] == 0x00 {
            continue;
        }
        dst.push(byte);
    }
    dst
}

/// Prefixes a NAL unit with its 4-byte big-endian length, the layout used
/// inside `mdat` and by the demuxer's sample units.
pub fn length_prefixed(nal: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nal.len() + 4);
    out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
    out.extend_from_slice(nal);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x1F, // 4-byte start code
            0x00, 0x00, 0x01, 0x68, 0xCE, // 3-byte start code
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00,
        ];
        let units: Vec<&[u8]> = AnnexBReader::new(&data).collect();
        assert_eq!(
            units,
            vec![
                &[0x67, 0x42, 0x1F][..],
                &[0x68, 0xCE][..],
                &[0x65, 0x88, 0x84, 0x00][..],
            ]
        );
    }

    #[test]
    fn test_no_start_code() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(AnnexBReader::new(&data).count(), 0);
        assert_eq!(AnnexBReader::new(&[]).count(), 0);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let data = [0xFF, 0xEE, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00];
        let units: Vec<&[u8]> = AnnexBReader::new(&data).collect();
        assert_eq!(units, vec![&[0x09, 0xF0, 0x00][..]]);
    }

    #[test]
    fn test_ebsp_to_rbsp() {
        assert_eq!(ebsp_to_rbsp(&[0x00, 0x00, 0x03, 0x01]), vec![0x00, 0x00, 0x01]);
        assert_eq!(
            ebsp_to_rbsp(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02]),
            vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]
        );
        assert_eq!(ebsp_to_rbsp(&[0x00, 0x01, 0x02, 0x03]), vec![0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_length_prefixed() {
        assert_eq!(length_prefixed(&[0x65, 0x88]), vec![0, 0, 0, 2, 0x65, 0x88]);
    }
}
