//! # AAC
//!
//! ADTS and LOAS/LATM framing, `AudioSpecificConfig` generation and the
//! silent access units used for gap filling.
//!
//! ```rust
//! use tsremux::codec::aac::AdtsParser;
//!
//! let payload = [0xFF, 0xF1, 0x50, 0x80, 0x01, 0x3F, 0xFC, 0x21, 0x10];
//! let frames: Vec<_> = AdtsParser::new(&payload).collect();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].sampling_frequency, 44100);
//! ```

pub mod adts;
pub mod config;
pub mod latm;
pub mod silent;
pub mod types;

pub use adts::{parse_adts_header, AdtsParser};
pub use config::AudioSpecificConfig;
pub use latm::LoasParser;
pub use silent::silent_frame;
pub use types::{sampling_frequency, AacFrame, AdtsHeader, SAMPLING_FREQUENCIES};
