//! # MPEG Transport Stream (TS) demuxing
//!
//! This module turns a byte stream of 188, 192 (M2TS) or 204 (FEC) byte
//! packets into elementary stream samples:
//!
//! - Packet size and sync offset detection
//! - Program Specific Information (PAT, PMT) with version tracking
//! - Packetized Elementary Stream (PES) reassembly
//! - PCR tracking with 33-bit wrap handling
//! - Side-channel streams: timed ID3, KLV, SCTE-35, SMPTE 2038, PGS
//!
//! ## Example Usage
//!
//! ```rust
//! use tsremux::format::ts::{ProbeResult, TSDemuxer};
//!
//! let mut data = Vec::new();
//! for _ in 0..4 {
//!     let mut packet = vec![0xffu8; 188];
//!     packet[..4].copy_from_slice(&[0x47, 0x1f, 0xff, 0x10]);
//!     data.extend_from_slice(&packet);
//! }
//!
//! match TSDemuxer::probe(&data) {
//!     ProbeResult::Match(probe) => assert_eq!(probe.ts_packet_size, 188),
//!     other => panic!("unexpected probe result: {:?}", other),
//! }
//! ```

/// TS demuxer implementation for extracting elementary streams
pub mod demuxer;

/// Packet size detection and PSI section parsing
pub mod parser;

/// PES header parsing
pub mod pes;

/// Core TS types and constants
pub mod types;


// Re-export commonly used types and constants
pub use demuxer::TSDemuxer;
pub use parser::{probe, ProbeData, ProbeResult};
pub use pes::PesHeader;
pub use types::{
    Pat, Pmt, M2TS_PACKET_SIZE, FEC_PACKET_SIZE, PID_PAT, STREAM_TYPE_ADTS_AAC, STREAM_TYPE_H264,
    STREAM_TYPE_H265, TS_PACKET_SIZE,
};
