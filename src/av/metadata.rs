use std::fmt;

use crate::codec::{FrameRate, Size};

/// Decoder configuration record carried by a video sample entry.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoConfig {
    /// `AVCDecoderConfigurationRecord`
    Avc(Vec<u8>),
    /// `HEVCDecoderConfigurationRecord`
    Hevc(Vec<u8>),
    /// `AV1CodecConfigurationRecord`
    Av1(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub id: u32,
    pub timescale: u32,
    pub duration: u64,
    pub codec_width: u32,
    pub codec_height: u32,
    pub present_width: u32,
    pub present_height: u32,
    pub profile: String,
    pub level: String,
    pub bit_depth: u8,
    pub chroma_format: u32,
    pub sar_ratio: Size,
    pub frame_rate: FrameRate,
    /// Nominal frame duration in milliseconds.
    pub ref_sample_duration: f64,
    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub codec: String,
    pub config: VideoConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub id: u32,
    pub timescale: u32,
    pub duration: u64,
    pub sample_rate: u32,
    pub channel_count: u8,
    /// Opus `channel_config_code`.
    pub channel_config_code: Option<u8>,
    /// Codec written to the sample entry: `mp4a.40.x`, `ac-3`, `ec-3`,
    /// `opus` or `mp3`.
    pub codec: String,
    /// Codec found in the stream.
    pub original_codec: String,
    /// Codec specific configuration (`AudioSpecificConfig`, `dac3`, `dec3`).
    pub config: Option<Vec<u8>>,
    /// Nominal frame duration in milliseconds.
    pub ref_sample_duration: Option<f64>,
    /// Set when the demuxer decodes the audio itself and the remuxer only
    /// produces silence to keep a valid audio track.
    pub silent_audio_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackMetadata {
    Audio(AudioMetadata),
    Video(VideoMetadata),
}

impl TrackMetadata {
    pub fn id(&self) -> u32 {
        match self {
            TrackMetadata::Audio(meta) => meta.id,
            TrackMetadata::Video(meta) => meta.id,
        }
    }

    pub fn codec(&self) -> &str {
        match self {
            TrackMetadata::Audio(meta) => &meta.codec,
            TrackMetadata::Video(meta) => &meta.codec,
        }
    }

    pub fn duration(&self) -> u64 {
        match self {
            TrackMetadata::Audio(meta) => meta.duration,
            TrackMetadata::Video(meta) => meta.duration,
        }
    }
}

/// Cumulative description of the demuxed stream. Fields are only ever
/// filled in, never cleared, until [`MediaInfo::reset`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaInfo {
    pub mime_type: Option<String>,
    pub duration: Option<u64>,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub audio_data_rate: Option<u32>,
    pub video_data_rate: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channel_count: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub ref_frames: Option<u32>,
    pub chroma_format: Option<String>,
    pub sar_num: Option<u32>,
    pub sar_den: Option<u32>,
}

impl MediaInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once every field required by the presence flags is known.
    pub fn is_complete(&self) -> bool {
        let audio_complete = !self.has_audio
            || (self.audio_codec.is_some()
                && self.audio_sample_rate.is_some()
                && self.audio_channel_count.is_some());
        let video_complete = !self.has_video
            || (self.video_codec.is_some()
                && self.width.is_some()
                && self.height.is_some()
                && self.fps.is_some()
                && self.profile.is_some()
                && self.level.is_some()
                && self.ref_frames.is_some()
                && self.chroma_format.is_some()
                && self.sar_num.is_some()
                && self.sar_den.is_some());

        self.mime_type.is_some() && audio_complete && video_complete
    }

    /// Rebuilds `mime_type` from the known codecs.
    pub fn update_mime_type(&mut self) {
        let codecs = match (&self.video_codec, &self.audio_codec) {
            (Some(video), Some(audio)) if self.has_video && self.has_audio => {
                format!("{},{}", video, audio)
            }
            (Some(video), _) if self.has_video => video.clone(),
            (_, Some(audio)) if self.has_audio => audio.clone(),
            _ => return,
        };
        self.mime_type = Some(format!("video/mp2t; codecs=\"{}\"", codecs));
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type.as_deref().unwrap_or("video/mp2t"))?;
        if let (Some(width), Some(height)) = (self.width, self.height) {
            write!(f, " {}x{}", width, height)?;
        }
        if let Some(fps) = self.fps {
            write!(f, " @{:.3}fps", fps)?;
        }
        if let (Some(rate), Some(channels)) = (self.audio_sample_rate, self.audio_channel_count) {
            write!(f, " {}Hz/{}ch", rate, channels)?;
        }
        Ok(())
    }
}
