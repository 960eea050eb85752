use bytes::Bytes;

use super::types::*;
use crate::error::{RemuxError, Result};

/// How many candidate offsets `probe` tries per packet size.
const PROBE_SCAN_LIMIT: usize = 1000;

/// Packet layout found by [`probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeData {
    pub ts_packet_size: usize,
    /// Offset of the first packet, M2TS timecode prefix included.
    pub sync_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Too few bytes to tell the packet size apart.
    NeedMoreData,
    NoMatch,
    Match(ProbeData),
}

/// Detects the packet size by looking for three sync bytes spaced by a
/// candidate size, trying 188, 192 (M2TS) and 204 (FEC) bytes in turn.
pub fn probe(data: &[u8]) -> ProbeResult {
    if data.len() <= 3 * TS_PACKET_SIZE {
        return ProbeResult::NeedMoreData;
    }

    for &size in &[TS_PACKET_SIZE, M2TS_PACKET_SIZE, FEC_PACKET_SIZE] {
        let scan = data.len().saturating_sub(3 * size).min(PROBE_SCAN_LIMIT);
        for offset in 0..scan {
            if data[offset] == SYNC_BYTE
                && data[offset + size] == SYNC_BYTE
                && data[offset + 2 * size] == SYNC_BYTE
            {
                let sync_offset = if size == M2TS_PACKET_SIZE && offset >= 4 {
                    offset - 4
                } else {
                    offset
                };
                return ProbeResult::Match(ProbeData {
                    ts_packet_size: size,
                    sync_offset,
                });
            }
        }
    }

    ProbeResult::NoMatch
}

/// The 33-bit PCR base of an adaptation field; `data` starts at the
/// first PCR byte.
pub fn parse_pcr_base(data: &[u8]) -> u64 {
    ((data[0] as u64) << 25)
        | ((data[1] as u64) << 17)
        | ((data[2] as u64) << 9)
        | ((data[3] as u64) << 1)
        | ((data[4] as u64) >> 7)
}

/// The 9-bit PCR extension; `data` starts at the first PCR byte.
pub fn parse_pcr_extension(data: &[u8]) -> u64 {
    (((data[4] & 0x01) as u64) << 8) | data[5] as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    pub program_number: u16,
    pub pid: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatSection {
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub programs: Vec<PatProgram>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
    /// The ES_info descriptor loop.
    pub es_info: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtSection {
    pub program_number: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub pcr_pid: u16,
    pub streams: Vec<PmtStream>,
}

fn read_pid(data: &[u8]) -> u16 {
    ((data[0] as u16 & 0x1f) << 8) | data[1] as u16
}

/// Checks the table id and the declared length, returning `section_length`.
fn section_length(section: &[u8], table_id: u8, name: &str) -> Result<usize> {
    if section.len() < 8 {
        return Err(RemuxError::InvalidData(format!("{} section too short", name)));
    }
    if section[0] != table_id {
        return Err(RemuxError::InvalidData(format!(
            "parse{}: table_id {} is not corresponded to {}!",
            name, section[0], name
        )));
    }
    let length = ((section[1] as usize & 0x0f) << 8) | section[2] as usize;
    if length < 9 || section.len() < length + 3 {
        return Err(RemuxError::InvalidData(format!(
            "{} section_length {} out of range",
            name, length
        )));
    }
    Ok(length)
}

/// Parses a complete PAT section, `table_id` first, CRC last.
pub fn parse_pat(section: &[u8]) -> Result<PatSection> {
    let length = section_length(section, TABLE_ID_PAT, "PAT")?;

    let mut programs = Vec::new();
    let end = 3 + length - 4;
    let mut pos = 8;
    while pos + 4 <= end {
        programs.push(PatProgram {
            program_number: u16::from_be_bytes([section[pos], section[pos + 1]]),
            pid: read_pid(&section[pos + 2..]),
        });
        pos += 4;
    }

    Ok(PatSection {
        version_number: (section[5] & 0x3e) >> 1,
        current_next_indicator: section[5] & 0x01 != 0,
        section_number: section[6],
        programs,
    })
}

/// Parses a complete PMT section, `table_id` first, CRC last.
pub fn parse_pmt(section: &[u8]) -> Result<PmtSection> {
    let length = section_length(section, TABLE_ID_PMT, "PMT")?;
    if length < 13 {
        return Err(RemuxError::InvalidData("PMT too short for program info".into()));
    }

    let program_info_length = ((section[10] as usize & 0x0f) << 8) | section[11] as usize;
    let end = 3 + length - 4;
    let mut pos = 12 + program_info_length;
    if pos > end {
        return Err(RemuxError::InvalidData("Program info data too short".into()));
    }

    let mut streams = Vec::new();
    while pos + 5 <= end {
        let stream_type = section[pos];
        let pid = read_pid(&section[pos + 1..]);
        let es_info_length = ((section[pos + 3] as usize & 0x0f) << 8) | section[pos + 4] as usize;
        pos += 5;

        if pos + es_info_length > end {
            return Err(RemuxError::InvalidData("ES info data too short".into()));
        }
        streams.push(PmtStream {
            stream_type,
            pid,
            es_info: Bytes::copy_from_slice(&section[pos..pos + es_info_length]),
        });
        pos += es_info_length;
    }

    Ok(PmtSection {
        program_number: u16::from_be_bytes([section[3], section[4]]),
        version_number: (section[5] & 0x3e) >> 1,
        current_next_indicator: section[5] & 0x01 != 0,
        section_number: section[6],
        pcr_pid: read_pid(&section[8..]),
        streams,
    })
}

/// Walks a descriptor loop, yielding `(tag, body)` pairs. Stops at the
/// first descriptor running past the end of the loop.
pub struct Descriptors<'a> {
    data: &'a [u8],
}

pub fn descriptors(data: &[u8]) -> Descriptors<'_> {
    Descriptors { data }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 2 {
            return None;
        }
        let tag = self.data[0];
        let length = self.data[1] as usize;
        let body = self.data.get(2..2 + length)?;
        self.data = &self.data[2 + length..];
        Some((tag, body))
    }
}

/// Four ASCII characters, as used by registration and metadata
/// descriptors.
pub fn fourcc(data: &[u8]) -> Option<&str> {
    data.get(..4).and_then(|bytes| std::str::from_utf8(bytes).ok())
}
