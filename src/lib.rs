#![doc(html_root_url = "https://docs.rs/tsremux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsremux - MPEG-TS to fragmented MP4
//!
//! `tsremux` demuxes MPEG Transport Streams and repackages their audio and
//! video into fragmented MP4 init and media segments, the form consumed by
//! Media Source style players.
//!
//! ## Features
//!
//! ### Input
//! - 188, 192 (M2TS) and 204 (FEC) byte packets, probed automatically
//! - PAT/PMT tracking with version changes and CRC verification
//! - PCR tracking across 33-bit wraps
//!
//! ### Codecs
//! - H.264/AVC and H.265/HEVC parameter set parsing, `avcC`/`hvcC`
//! - AAC in ADTS and LOAS/LATM framing
//! - AC-3, E-AC-3, Opus, MPEG-1/2 audio
//!
//! ### Side channels
//! - Timed ID3, KLV, SCTE-35, SMPTE 2038, PGS subtitles, PES private data
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tsremux = "0.1.0"
//! ```
//!
//! ### Transmuxing a file
//!
//! ```rust,no_run
//! use tsremux::config::Config;
//! use tsremux::format::mp4::{InitSegment, MediaSegment};
//! use tsremux::transmuxer::{TransmuxListener, Transmuxer};
//!
//! struct Writer;
//!
//! impl TransmuxListener for Writer {
//!     fn on_init_segment(&mut self, segment: InitSegment) {
//!         println!("{} init segment: {} bytes", segment.container, segment.data.len());
//!     }
//!     fn on_media_segment(&mut self, segment: MediaSegment) {
//!         println!("{} media segment: {} samples", segment.track_type, segment.sample_count);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let mut transmuxer = Transmuxer::new(config, Box::new(Writer));
//!
//!     let mut file = tokio::fs::File::open("input.ts").await?;
//!     transmuxer.feed_reader(&mut file).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: Samples, tracks, track metadata and the demuxer listener
//!
//! - `codec`: Elementary stream parsers and decoder configuration records
//!   - H.264/AVC and H.265/HEVC
//!   - AAC, AC-3, E-AC-3, Opus, MPEG audio
//!   - SCTE-35, KLV, SMPTE 2038
//!
//! - `format`: Containers
//!   - `ts`: Transport Stream demuxer
//!   - `mp4`: Box builder, remuxer and segment timeline
//!
//! - `transmuxer`: Glue from TS bytes to fMP4 segments
//!
//! - `config`, `error`: Options and error types
//!
//! - `utils`: Bitstream reading and MPEG-2 CRC32
//!
/// Audio/Video base types and utilities
pub mod av;

/// Codec implementations for video and audio formats
pub mod codec;

/// Error types and utilities
pub mod error;

/// Media format implementations (TS, fMP4)
pub mod format;

/// TS to fMP4 pipeline
pub mod transmuxer;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use config::Config;
pub use error::{ErrorKind, RemuxError, Result};
pub use format::mp4::MP4Remuxer;
pub use format::ts::TSDemuxer;
pub use transmuxer::Transmuxer;
