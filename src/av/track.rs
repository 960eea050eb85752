use bytes::Bytes;

use super::TrackType;

/// A NAL unit ready for `mdat`: 4-byte big-endian length prefix included.
#[derive(Debug, Clone, PartialEq)]
pub struct NalUnit {
    pub nal_type: u8,
    pub data: Bytes,
}

impl NalUnit {
    pub fn new(nal_type: u8, data: impl Into<Bytes>) -> Self {
        Self {
            nal_type,
            data: data.into(),
        }
    }

    /// The unit without its length prefix.
    pub fn payload(&self) -> &[u8] {
        self.data.get(4..).unwrap_or_default()
    }
}

/// One access unit of a video elementary stream. Times are milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSample {
    pub units: Vec<NalUnit>,
    /// Total byte length of `units`, prefixes included.
    pub length: usize,
    pub is_keyframe: bool,
    pub dts: i64,
    pub pts: i64,
    pub cts: i64,
    /// Byte offset of the PES packet carrying this sample.
    pub file_position: Option<u64>,
}

impl VideoSample {
    pub fn new(units: Vec<NalUnit>, dts: i64, pts: i64) -> Self {
        let length = units.iter().map(|u| u.data.len()).sum();
        Self {
            units,
            length,
            is_keyframe: false,
            dts,
            pts,
            cts: pts - dts,
            file_position: None,
        }
    }

    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    pub fn with_file_position(mut self, file_position: u64) -> Self {
        self.file_position = Some(file_position);
        self
    }
}

/// One compressed audio frame. Times are milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    pub unit: Bytes,
    pub length: usize,
    pub dts: i64,
    pub pts: i64,
}

impl AudioSample {
    pub fn new(unit: impl Into<Bytes>, pts: i64) -> Self {
        let unit = unit.into();
        Self {
            length: unit.len(),
            unit,
            dts: pts,
            pts,
        }
    }
}

/// Samples of one track accumulated by the demuxer and drained by the
/// remuxer after each dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Track<S> {
    pub track_type: TrackType,
    pub id: u32,
    pub sequence_number: u32,
    pub samples: Vec<S>,
    /// Payload bytes held by `samples`.
    pub length: usize,
}

pub type VideoTrack = Track<VideoSample>;
pub type AudioTrack = Track<AudioSample>;

impl<S> Track<S> {
    pub fn new(track_type: TrackType, id: u32) -> Self {
        Self {
            track_type,
            id,
            sequence_number: 0,
            samples: Vec::new(),
            length: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.length = 0;
    }
}

impl VideoTrack {
    pub fn push(&mut self, sample: VideoSample) {
        self.length += sample.length;
        self.samples.push(sample);
    }
}

impl AudioTrack {
    pub fn push(&mut self, sample: AudioSample) {
        self.length += sample.length;
        self.samples.push(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_track_accounting() {
        let mut track = VideoTrack::new(TrackType::Video, 1);
        let units = vec![
            NalUnit::new(5, vec![0, 0, 0, 2, 0x65, 0x88]),
            NalUnit::new(6, vec![0, 0, 0, 1, 0x06]),
        ];
        track.push(VideoSample::new(units, 40, 80).with_keyframe(true));

        assert_eq!(track.length, 11);
        assert_eq!(track.samples[0].cts, 40);
        assert_eq!(track.samples[0].units[0].payload(), &[0x65, 0x88]);

        track.clear();
        assert!(track.is_empty());
        assert_eq!(track.length, 0);
    }
}
