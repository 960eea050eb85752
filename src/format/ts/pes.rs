use crate::error::{RemuxError, Result};

// Stream ids whose PES packets carry no optional header
pub const STREAM_ID_PROGRAM_STREAM_MAP: u8 = 0xbc;
pub const STREAM_ID_PADDING: u8 = 0xbe;
pub const STREAM_ID_PRIVATE_STREAM_2: u8 = 0xbf;
pub const STREAM_ID_ECM: u8 = 0xf0;
pub const STREAM_ID_EMM: u8 = 0xf1;
pub const STREAM_ID_DSMCC: u8 = 0xf2;
pub const STREAM_ID_H222_1_TYPE_E: u8 = 0xf8;
pub const STREAM_ID_PROGRAM_STREAM_DIRECTORY: u8 = 0xff;

/// Whether PES packets of `stream_id` go without the optional header.
pub fn is_headerless_stream(stream_id: u8) -> bool {
    matches!(
        stream_id,
        STREAM_ID_PROGRAM_STREAM_MAP
            | STREAM_ID_PADDING
            | STREAM_ID_PRIVATE_STREAM_2
            | STREAM_ID_ECM
            | STREAM_ID_EMM
            | STREAM_ID_DSMCC
            | STREAM_ID_H222_1_TYPE_E
            | STREAM_ID_PROGRAM_STREAM_DIRECTORY
    )
}

/// Header fields of a reassembled PES packet. Timestamps are the raw
/// 33-bit, 90 kHz values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub packet_length: u16,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub payload_offset: usize,
    pub payload_length: usize,
}

/// Decodes a 5-byte PTS/DTS field.
pub fn read_timestamp(data: &[u8]) -> u64 {
    (((data[0] & 0x0e) as u64) << 29)
        | ((data[1] as u64) << 22)
        | (((data[2] & 0xfe) as u64) << 14)
        | ((data[3] as u64) << 7)
        | ((data[4] as u64) >> 1)
}

pub fn has_start_code(data: &[u8]) -> bool {
    data.len() >= 3 && data[0] == 0x00 && data[1] == 0x00 && data[2] == 0x01
}

/// Parses the header of a complete PES packet.
///
/// For headerless stream ids the payload starts right after
/// `PES_packet_length`; a zero packet length means the payload runs to the
/// end of `data`.
pub fn parse_pes_header(data: &[u8]) -> Result<PesHeader> {
    if data.len() < 6 || !has_start_code(data) {
        return Err(RemuxError::InvalidData("PES start code mismatch".into()));
    }
    let stream_id = data[3];
    let packet_length = u16::from_be_bytes([data[4], data[5]]);

    if is_headerless_stream(stream_id) {
        let payload_length = if packet_length != 0 {
            packet_length as usize
        } else {
            data.len() - 6
        };
        return Ok(PesHeader {
            stream_id,
            packet_length,
            pts: None,
            dts: None,
            payload_offset: 6,
            payload_length: payload_length.min(data.len() - 6),
        });
    }

    if data.len() < 9 {
        return Err(RemuxError::InvalidData("PES header too short".into()));
    }
    let pts_dts_flags = (data[7] & 0xc0) >> 6;
    let header_data_length = data[8] as usize;
    let payload_offset = 9 + header_data_length;

    let (mut pts, mut dts) = (None, None);
    if pts_dts_flags == 2 || pts_dts_flags == 3 {
        let field_end = if pts_dts_flags == 3 { 19 } else { 14 };
        if data.len() < field_end {
            return Err(RemuxError::InvalidData("PES timestamps truncated".into()));
        }
        pts = Some(read_timestamp(&data[9..14]));
        dts = if pts_dts_flags == 3 {
            Some(read_timestamp(&data[14..19]))
        } else {
            pts
        };
    }

    let payload_length = if packet_length != 0 {
        let packet_length = packet_length as usize;
        if packet_length < 3 + header_data_length {
            return Err(RemuxError::InvalidData(
                "Malformed PES: PES_packet_length < 3 + PES_header_data_length".into(),
            ));
        }
        packet_length - 3 - header_data_length
    } else {
        data.len().saturating_sub(payload_offset)
    };
    if payload_offset + payload_length > data.len() {
        return Err(RemuxError::InvalidData("PES payload truncated".into()));
    }

    Ok(PesHeader {
        stream_id,
        packet_length,
        pts,
        dts,
        payload_offset,
        payload_length,
    })
}
