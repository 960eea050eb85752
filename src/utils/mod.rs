//! Helpers shared by the container and codec parsers.
//!
//! [`BitReader`] walks MSB-first bitstreams such as SPS, ADTS and LATM
//! headers, exp-Golomb codes included:
//!
//! ```rust
//! use tsremux::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // ADTS syncword, then ue(v) = 3 coded as 00100
//! let header = [0xFF, 0xF1, 0b0010_0000];
//! let mut reader = BitReader::new(&header);
//! assert_eq!(reader.read_bits(12)?, 0xFFF);
//! reader.skip_bits(4)?;
//! assert_eq!(reader.read_ueg()?, 3);
//! # Ok(())
//! # }
//! ```
//!
//! [`Crc32Mpeg2`] checks PSI and splice_info sections, which carry their
//! CRC in the last four bytes:
//!
//! ```rust
//! use tsremux::utils::Crc32Mpeg2;
//!
//! let mut section = vec![0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00];
//! let crc = Crc32Mpeg2::calculate(&section);
//! section.extend_from_slice(&crc.to_be_bytes());
//! assert!(Crc32Mpeg2::verify(&section));
//!
//! section[3] ^= 0x01;
//! assert!(!Crc32Mpeg2::verify(&section));
//! ```

pub mod bits;
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
