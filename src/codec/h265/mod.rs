//! # H.265/HEVC
//!
//! Parameter set parsing (VPS, SPS, PPS) and `hvcC` construction. The
//! demuxer splits PES payloads with [`crate::codec::annexb::AnnexBReader`]
//! and hands VPS/SPS/PPS units to the parsers here. Only the fields needed
//! for the decoder configuration record and track metadata are kept; the
//! rest of each parameter set is skipped.

/// `HEVCDecoderConfigurationRecord` builder
pub mod hvcc;
/// VPS, SPS and PPS parsers
pub mod parser;
/// NAL unit types and parsed parameter set structures
pub mod types;


pub use hvcc::build_hvcc;
pub use parser::{parse_pps, parse_sps, parse_vps};
pub use types::{NalUnitType, PpsInfo, SpsInfo, VpsInfo};
