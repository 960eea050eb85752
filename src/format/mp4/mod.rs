//! # Fragmented MP4 output
//!
//! [`boxes`] synthesizes ISO-BMFF boxes, [`MP4Remuxer`] turns demuxed sample
//! batches into init and media segments, and [`MediaSegmentInfoList`]
//! indexes what was emitted per track.

pub mod boxes;
mod remuxer;
pub mod timeline;

pub use remuxer::{InitSegment, MP4Remuxer, MediaSegment, RemuxListener};
pub use timeline::{MediaSegmentInfoList, SampleInfo, SegmentInfo};
