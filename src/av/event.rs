//! Side-channel data surfaced by the demuxer next to the audio/video
//! tracks. All times are milliseconds.

use bytes::Bytes;

use crate::codec::klv::AccessUnit;
use crate::codec::scte35::Scte35Data;
use crate::codec::smpte2038::AncillaryData;

/// Payload of a PES packet the demuxer does not interpret: PES private
/// data, timed ID3 and asynchronous KLV.
#[derive(Debug, Clone, PartialEq)]
pub struct PesPrivateData {
    pub pid: u16,
    pub stream_id: u8,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Last audio pts or PCR, set when the packet carries no pts.
    pub nearest_pts: Option<i64>,
    pub len: usize,
    pub data: Bytes,
}

/// Descriptors found on a PES private data (`0x06`) elementary stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PesPrivateDataDescriptor {
    pub pid: u16,
    pub stream_type: u8,
    pub descriptor: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PgsSubtitleData {
    pub pid: u16,
    pub stream_id: u8,
    /// ISO 639 language, `und` when not signalled.
    pub lang: String,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub len: usize,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KlvData {
    pub pid: u16,
    pub stream_id: u8,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub access_units: Vec<AccessUnit>,
    pub len: usize,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Smpte2038Data {
    pub pid: u16,
    pub stream_id: u8,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub nearest_pts: Option<i64>,
    pub ancillaries: Vec<AncillaryData>,
    pub len: usize,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scte35Metadata {
    pub pid: u16,
    /// Splice time converted to milliseconds.
    pub pts: Option<i64>,
    pub nearest_pts: Option<i64>,
    pub splice: Scte35Data,
}

/// A compressed frame handed to an external decoder instead of being
/// packaged into fMP4.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudioFrame {
    pub codec: &'static str,
    pub data: Bytes,
    pub pts: i64,
}
