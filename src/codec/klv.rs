//! Metadata access units carried in synchronous KLV PES payloads
//! (ISO/IEC 13818-1 metadata AU cells).

use bytes::Bytes;

/// One metadata access unit cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub service_id: u8,
    pub sequence_number: u8,
    pub flags: u8,
    pub data: Bytes,
}

/// Splits a payload into 5-byte-header access unit cells. A cell whose
/// declared size runs past the payload end is truncated to what is there.
pub fn parse_access_units(data: &[u8]) -> Vec<AccessUnit> {
    let mut units = Vec::new();
    let mut offset = 0;
    while offset + 5 < data.len() {
        let size = u16::from_be_bytes([data[offset + 3], data[offset + 4]]) as usize;
        let start = offset + 5;
        let end = (start + size).min(data.len());
        units.push(AccessUnit {
            service_id: data[offset],
            sequence_number: data[offset + 1],
            flags: data[offset + 2],
            data: Bytes::copy_from_slice(&data[start..end]),
        });
        offset = start + size;
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_cells() {
        let data = [
            0x01, 0x00, 0xC0, 0x00, 0x03, 0xAA, 0xBB, 0xCC, //
            0x01, 0x01, 0x80, 0x00, 0x02, 0xDD, 0xEE,
        ];
        let units = parse_access_units(&data);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].flags, 0xC0);
        assert_eq!(units[0].data.as_ref(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(units[1].sequence_number, 1);
        assert_eq!(units[1].data.as_ref(), &[0xDD, 0xEE]);
    }

    #[test]
    fn test_truncated_cell() {
        let units = parse_access_units(&[0x01, 0x00, 0x00, 0x00, 0x10, 0xAA, 0xBB]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].data.as_ref(), &[0xAA, 0xBB]);
        assert!(parse_access_units(&[0x01, 0x00, 0x00, 0x00, 0x00]).is_empty());
    }
}
