use std::collections::{HashMap, HashSet};

use bytes::{Bytes, BytesMut};

pub const SYNC_BYTE: u8 = 0x47;

// Packet sizes
pub const TS_PACKET_SIZE: usize = 188;
/// M2TS: 4-byte timecode prefix before every packet.
pub const M2TS_PACKET_SIZE: usize = 192;
/// 16 bytes of Reed-Solomon parity after every packet.
pub const FEC_PACKET_SIZE: usize = 204;

// PIDs
pub const PID_PAT: u16 = 0x0000;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_PES_PRIVATE_DATA: u8 = 0x06;
pub const STREAM_TYPE_ADTS_AAC: u8 = 0x0f;
pub const STREAM_TYPE_LOAS_AAC: u8 = 0x11;
pub const STREAM_TYPE_METADATA: u8 = 0x15;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AC3: u8 = 0x81;
pub const STREAM_TYPE_SCTE35: u8 = 0x86;
pub const STREAM_TYPE_EAC3: u8 = 0x87;
pub const STREAM_TYPE_PGS: u8 = 0x90;

// Descriptor tags
pub const DESCRIPTOR_REGISTRATION: u8 = 0x05;
pub const DESCRIPTOR_ISO_639_LANGUAGE: u8 = 0x0a;
pub const DESCRIPTOR_METADATA: u8 = 0x26;
pub const DESCRIPTOR_AC3: u8 = 0x6a;
pub const DESCRIPTOR_EAC3: u8 = 0x7a;
pub const DESCRIPTOR_DVB_EXTENSION: u8 = 0x7f;
pub const DESCRIPTOR_AV1_VIDEO: u8 = 0x80;
pub const DESCRIPTOR_ATSC_AC3: u8 = 0x81;
pub const DESCRIPTOR_ATSC_AC3_AUDIO_STREAM: u8 = 0x82;

// Clocks
pub const PTS_HZ: u64 = 90_000;
pub const PTS_WRAP: u64 = 1 << 33;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pat {
    pub version_number: u8,
    pub network_pid: Option<u16>,
    pub program_pmt_pid: HashMap<u16, u16>,
}

/// The primary elementary PIDs of a program. At most one video and one
/// audio codec is tracked; the first stream seen wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommonPids {
    pub h264: Option<u16>,
    pub h265: Option<u16>,
    pub av1: Option<u16>,
    pub adts_aac: Option<u16>,
    pub loas_aac: Option<u16>,
    pub ac3: Option<u16>,
    pub eac3: Option<u16>,
    pub opus: Option<u16>,
    pub mp3: Option<u16>,
}

impl CommonPids {
    pub fn video(&self) -> Option<u16> {
        self.h264.or(self.h265)
    }

    pub fn audio(&self) -> Option<u16> {
        self.adts_aac
            .or(self.loas_aac)
            .or(self.ac3)
            .or(self.eac3)
            .or(self.opus)
            .or(self.mp3)
    }

    pub fn contains(&self, pid: u16) -> bool {
        [
            self.h264,
            self.h265,
            self.av1,
            self.adts_aac,
            self.loas_aac,
            self.ac3,
            self.eac3,
            self.opus,
            self.mp3,
        ]
        .contains(&Some(pid))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pmt {
    pub program_number: u16,
    pub version_number: u8,
    pub pcr_pid: u16,
    pub pid_stream_type: HashMap<u16, u8>,
    pub common_pids: CommonPids,
    pub pes_private_data_pids: HashSet<u16>,
    pub timed_id3_pids: HashSet<u16>,
    pub synchronous_klv_pids: HashSet<u16>,
    pub asynchronous_klv_pids: HashSet<u16>,
    pub scte_35_pids: HashSet<u16>,
    pub smpte2038_pids: HashSet<u16>,
    /// PGS subtitle PIDs with their ISO 639 language.
    pub pgs_langs: HashMap<u16, String>,
}

impl Pmt {
    pub fn new(program_number: u16, version_number: u8) -> Self {
        Self {
            program_number,
            version_number,
            ..Default::default()
        }
    }

    /// Whether payloads on `pid` go to the PES reassembler.
    pub fn is_pes_pid(&self, pid: u16) -> bool {
        self.pid_stream_type.contains_key(&pid)
            && (self.common_pids.contains(pid)
                || self.pes_private_data_pids.contains(&pid)
                || self.timed_id3_pids.contains(&pid)
                || self.pgs_langs.contains_key(&pid)
                || self.synchronous_klv_pids.contains(&pid)
                || self.asynchronous_klv_pids.contains(&pid))
    }
}

/// Bytes of one PSI section or PES packet gathered across TS packets.
#[derive(Debug, Default)]
pub struct SliceQueue {
    pub data: BytesMut,
    /// Declared unit length, 0 while unknown (or for unbounded PES).
    pub expected_length: usize,
    /// Byte offset of the TS packet that opened the unit.
    pub file_position: u64,
    pub random_access_indicator: bool,
}

impl SliceQueue {
    pub fn new(file_position: u64, random_access_indicator: bool) -> Self {
        Self {
            file_position,
            random_access_indicator,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.expected_length > 0 && self.data.len() == self.expected_length
    }

    /// Appends what the current section still needs from `bytes` and
    /// returns the number of bytes taken. The length is learnt from the
    /// section header once its first three bytes are in.
    pub fn append_section_bytes(&mut self, bytes: &[u8]) -> usize {
        let mut taken = 0;
        if self.expected_length == 0 {
            let need = 3usize.saturating_sub(self.data.len()).min(bytes.len());
            self.data.extend_from_slice(&bytes[..need]);
            taken = need;
            if self.data.len() < 3 {
                return taken;
            }
            let section_length = ((self.data[1] as usize & 0x0f) << 8) | self.data[2] as usize;
            self.expected_length = section_length + 3;
        }

        let need = self
            .expected_length
            .saturating_sub(self.data.len())
            .min(bytes.len() - taken);
        self.data.extend_from_slice(&bytes[taken..taken + need]);
        taken + need
    }

    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }
}
