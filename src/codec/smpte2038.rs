//! SMPTE ST 2038 ancillary data packets carried in PES.

use bytes::Bytes;

use crate::utils::BitReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncillaryData {
    pub yc_indicator: bool,
    pub line_number: u16,
    pub horizontal_offset: u16,
    pub did: u8,
    pub sdid: u8,
    pub user_data: Bytes,
    pub description: &'static str,
}

fn describe(did: u8, sdid: u8) -> &'static str {
    match (did, sdid) {
        (0x41, 0x07) => "SCTE-104",
        (0x5F, 0xDC) => "ARIB STD-B37 (1SEG)",
        (0x5F, 0xDD) => "ARIB STD-B37 (ANALOG)",
        (0x5F, 0xDE) => "ARIB STD-B37 (SD)",
        (0x5F, 0xDF) => "ARIB STD-B37 (HD)",
        (0x61, 0x01) => "EIA-708",
        (0x61, 0x02) => "EIA-608",
        _ => "User Defined",
    }
}

/// Decodes the ANC packets of a PES payload. Decoding stops at the first
/// packet not starting with the six zero bits, or when the payload runs out.
pub fn parse_ancillary_data(data: &[u8]) -> Vec<AncillaryData> {
    let mut reader = BitReader::new(data);
    let mut packets = Vec::new();
    while let Ok(Some(packet)) = parse_packet(&mut reader) {
        packets.push(packet);
    }
    packets
}

fn parse_packet(reader: &mut BitReader) -> crate::Result<Option<AncillaryData>> {
    if reader.read_bits(6)? != 0 {
        return Ok(None);
    }
    let yc_indicator = reader.read_bool()?;
    let line_number = reader.read_bits(11)? as u16;
    let horizontal_offset = reader.read_bits(12)? as u16;
    // 10-bit words, parity bits dropped
    let did = reader.read_bits(10)? as u8;
    let sdid = reader.read_bits(10)? as u8;
    let data_count = reader.read_bits(10)? as u8;
    let mut user_data = Vec::with_capacity(data_count as usize);
    for _ in 0..data_count {
        user_data.push(reader.read_bits(10)? as u8);
    }
    reader.skip_bits(10)?; // checksum_word
    reader.align_byte();

    Ok(Some(AncillaryData {
        yc_indicator,
        line_number,
        horizontal_offset,
        did,
        sdid,
        user_data: Bytes::from(user_data),
        description: describe(did, sdid),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bits::test_utils::BitWriter;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_cea708_packet() {
        let mut w = BitWriter::new();
        w.bits(6, 0).flag(false).bits(11, 9).bits(12, 0);
        w.bits(10, 0x261).bits(10, 0x101).bits(10, 0x102);
        w.bits(10, 0x1AB).bits(10, 0x2CD);
        w.bits(10, 0x155); // checksum
        // 90 bits written, stuff to the byte boundary
        w.bits(6, 0x3F);
        w.bits(8, 0xFF);
        let packets = parse_ancillary_data(&w.into_bytes());

        assert_eq!(packets.len(), 1);
        let packet = &packets[0];
        assert_eq!(packet.line_number, 9);
        assert_eq!(packet.did, 0x61);
        assert_eq!(packet.sdid, 0x01);
        assert_eq!(packet.description, "EIA-708");
        assert_eq!(packet.user_data.as_ref(), &[0xAB, 0xCD]);
    }

    #[test]
    fn test_empty_payload() {
        assert!(parse_ancillary_data(&[]).is_empty());
    }
}
