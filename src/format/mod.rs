//! Container formats: MPEG-TS in, fragmented MP4 out.

/// Fragmented MP4 box synthesis and remuxing
pub mod mp4;
/// MPEG-TS demuxing
pub mod ts;
