//! # H.264/AVC
//!
//! Sequence parameter set decoding and `avcC` construction for the TS
//! demuxer. NAL units are located with [`crate::codec::annexb::AnnexBReader`].
//!
//! ## Example: Parsing an SPS
//!
//! ```rust
//! use tsremux::codec::h264::parse_sps;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Baseline, level 3.0, 320x240
//! let sps = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
//! let info = parse_sps(&sps)?;
//! assert_eq!(info.codec_mimetype, "avc1.42c01e");
//! assert_eq!((info.codec_size.width, info.codec_size.height), (320, 240));
//! # Ok(())
//! # }
//! ```

/// `AVCDecoderConfigurationRecord` builder
pub mod avcc;
/// Sequence parameter set parser
pub mod parser;
/// NAL unit types and parsed parameter set structures
pub mod types;


#[doc(inline)]
pub use avcc::build_avcc;
#[doc(inline)]
pub use parser::parse_sps;
#[doc(inline)]
pub use types::{NalUnitType, SpsInfo};
