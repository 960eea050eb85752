use std::fmt;

use crate::error::ErrorKind;

mod event;
mod metadata;
mod track;

pub use event::*;
pub use metadata::*;
pub use track::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Audio,
    Video,
}

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Audio => "audio",
            TrackType::Video => "video",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives everything a demuxer produces.
///
/// `on_data_available` hands over the tracks themselves; the receiver drains
/// the samples it consumes and leaves the rest for the next dispatch.
/// Side-channel callbacks default to dropping the data.
pub trait DemuxListener: Send {
    fn on_error(&mut self, kind: ErrorKind, detail: &str);
    fn on_media_info(&mut self, info: &MediaInfo);
    fn on_track_metadata(&mut self, metadata: TrackMetadata);
    fn on_data_available(&mut self, audio: Option<&mut AudioTrack>, video: Option<&mut VideoTrack>);

    fn on_timed_id3_metadata(&mut self, _data: PesPrivateData) {}
    fn on_pgs_subtitle_data(&mut self, _data: PgsSubtitleData) {}
    fn on_synchronous_klv_metadata(&mut self, _data: KlvData) {}
    fn on_asynchronous_klv_metadata(&mut self, _data: PesPrivateData) {}
    fn on_smpte2038_metadata(&mut self, _data: Smpte2038Data) {}
    fn on_scte35_metadata(&mut self, _data: Scte35Metadata) {}
    fn on_pes_private_data(&mut self, _data: PesPrivateData) {}
    fn on_pes_private_data_descriptor(&mut self, _data: PesPrivateDataDescriptor) {}
    /// MPEG Layer II frames when software decoding is enabled.
    fn on_raw_audio_data(&mut self, _frame: RawAudioFrame) {}
}
