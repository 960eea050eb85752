use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};

use super::boxes::{self, FragmentSample, SampleFlags};
use super::timeline::{MediaSegmentInfoList, SampleInfo, SegmentInfo};
use crate::av::{
    AudioMetadata, AudioSample, AudioTrack, TrackMetadata, TrackType, VideoMetadata, VideoSample,
    VideoTrack,
};
use crate::codec::aac::silent_frame;
use crate::config::RemuxConfig;
use crate::error::{RemuxError, Result};

/// Deviation from the expected audio clock, in reference frame durations,
/// past which frames are dropped or silence is inserted.
const AUDIO_DRIFT_THRESHOLD: f64 = 3.0;
/// Gaps up to this many milliseconds between segments are treated as
/// rounding noise.
const CONTINUATION_TOLERANCE_MS: i64 = 3;

/// An initialization segment ready for a source buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSegment {
    pub track_type: TrackType,
    /// `ftyp` + `moov`; empty for raw MP3.
    pub data: Bytes,
    pub codec: String,
    /// `audio/mp4`, `video/mp4` or `audio/mpeg`.
    pub container: String,
    pub media_duration: u64,
}

/// One `moof` + `mdat` fragment (or raw MP3 frames).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub track_type: TrackType,
    pub data: Bytes,
    pub sample_count: usize,
    pub info: SegmentInfo,
    /// Set on the first raw MP3 segment after a discontinuity, where the
    /// consumer has to position the data itself.
    pub timestamp_offset: Option<i64>,
}

/// Consumer of the fMP4 output.
pub trait RemuxListener: Send {
    fn on_init_segment(&mut self, segment: InitSegment);
    fn on_media_segment(&mut self, segment: MediaSegment);
}

/// A sample placed on the output timeline.
#[derive(Debug, Clone)]
struct OutputSample {
    dts: i64,
    pts: i64,
    cts: i64,
    duration: i64,
    original_dts: i64,
    size: usize,
    is_keyframe: bool,
    flags: SampleFlags,
}

impl OutputSample {
    fn audio(dts: i64, duration: i64, original_dts: i64, size: usize) -> Self {
        Self {
            dts,
            pts: dts,
            cts: 0,
            duration,
            original_dts,
            size,
            is_keyframe: false,
            flags: SampleFlags::audio(),
        }
    }

    fn fragment(&self) -> FragmentSample {
        FragmentSample {
            duration: self.duration.max(0) as u32,
            size: self.size as u32,
            cts: self.cts as i32,
            flags: self.flags,
        }
    }

    fn info(&self) -> SampleInfo {
        SampleInfo::new(
            self.dts,
            self.pts,
            self.duration,
            self.original_dts,
            self.is_keyframe,
        )
    }
}

/// Turns per-track sample batches into fMP4 segments.
///
/// All output timestamps are relative to the first dts seen, and each track
/// keeps a running expected dts so consecutive batches line up without
/// gaps or overlaps. The last sample of every batch is held back until the
/// next batch arrives so its duration can be measured instead of guessed.
pub struct MP4Remuxer {
    config: RemuxConfig,
    listener: Option<Box<dyn RemuxListener>>,

    dts_base: i64,
    dts_base_inited: bool,

    audio_next_dts: Option<f64>,
    video_next_dts: Option<i64>,
    audio_stashed_last_sample: Option<AudioSample>,
    video_stashed_last_sample: Option<VideoSample>,

    audio_meta: Option<AudioMetadata>,
    video_meta: Option<VideoMetadata>,
    audio_timeline: MediaSegmentInfoList,
    video_timeline: MediaSegmentInfoList,

    silent_audio_mode: bool,
    silent_audio_last_dts: Option<f64>,
    silent_sequence_number: u32,
}

impl MP4Remuxer {
    pub fn new(config: RemuxConfig) -> Self {
        Self {
            config,
            listener: None,
            dts_base: 0,
            dts_base_inited: false,
            audio_next_dts: None,
            video_next_dts: None,
            audio_stashed_last_sample: None,
            video_stashed_last_sample: None,
            audio_meta: None,
            video_meta: None,
            audio_timeline: MediaSegmentInfoList::new("audio"),
            video_timeline: MediaSegmentInfoList::new("video"),
            silent_audio_mode: false,
            silent_audio_last_dts: None,
            silent_sequence_number: 0,
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn RemuxListener>) {
        self.listener = Some(listener);
    }

    pub fn config(&self) -> &RemuxConfig {
        &self.config
    }

    /// The dts all output is relative to, once the first batch arrived.
    pub fn get_timestamp_base(&self) -> Option<i64> {
        self.dts_base_inited.then_some(self.dts_base)
    }

    pub fn audio_timeline(&self) -> &MediaSegmentInfoList {
        &self.audio_timeline
    }

    pub fn video_timeline(&self) -> &MediaSegmentInfoList {
        &self.video_timeline
    }

    /// Forgets the expected next dts of both tracks so the next batch is
    /// aligned through the segment timeline instead.
    pub fn insert_discontinuity(&mut self) {
        self.audio_next_dts = None;
        self.video_next_dts = None;
        self.silent_audio_last_dts = None;
    }

    pub fn seek(&mut self) {
        self.audio_stashed_last_sample = None;
        self.video_stashed_last_sample = None;
        self.audio_timeline.clear();
        self.video_timeline.clear();
        self.silent_audio_last_dts = None;
    }

    pub fn destroy(&mut self) {
        self.dts_base = 0;
        self.dts_base_inited = false;
        self.silent_audio_mode = false;
        self.silent_audio_last_dts = None;
        self.audio_meta = None;
        self.video_meta = None;
        self.audio_timeline.clear();
        self.video_timeline.clear();
        self.listener = None;
    }

    /// Stores the track description and emits its init segment.
    pub fn on_track_metadata(&mut self, metadata: TrackMetadata) -> Result<()> {
        let segment = match &metadata {
            TrackMetadata::Audio(meta) => {
                if meta.silent_audio_mode {
                    self.silent_audio_mode = true;
                }
                let segment = if meta.codec == "mp3" && self.config.mp3_use_mpeg_audio {
                    InitSegment {
                        track_type: TrackType::Audio,
                        data: Bytes::new(),
                        codec: String::new(),
                        container: "audio/mpeg".into(),
                        media_duration: meta.duration,
                    }
                } else {
                    InitSegment {
                        track_type: TrackType::Audio,
                        data: Bytes::from(boxes::init_segment(&metadata)),
                        codec: meta.codec.clone(),
                        container: "audio/mp4".into(),
                        media_duration: meta.duration,
                    }
                };
                self.audio_meta = Some(meta.clone());
                segment
            }
            TrackMetadata::Video(meta) => {
                self.video_meta = Some(meta.clone());
                InitSegment {
                    track_type: TrackType::Video,
                    data: Bytes::from(boxes::init_segment(&metadata)),
                    codec: meta.codec.clone(),
                    container: "video/mp4".into(),
                    media_duration: meta.duration,
                }
            }
        };

        let listener = self.listener.as_mut().ok_or_else(|| {
            RemuxError::Precondition("MP4Remuxer: init segment listener must be set".into())
        })?;
        listener.on_init_segment(segment);
        Ok(())
    }

    /// Remuxes whatever samples the tracks hold and drains them.
    pub fn remux(
        &mut self,
        audio: Option<&mut AudioTrack>,
        video: Option<&mut VideoTrack>,
    ) -> Result<()> {
        if self.listener.is_none() {
            return Err(RemuxError::Precondition(
                "MP4Remuxer: media segment listener must be set".into(),
            ));
        }

        if !self.dts_base_inited {
            self.calculate_dts_base(audio.as_deref(), video.as_deref());
        }

        let mut video_range = None;
        if let Some(video) = video {
            if let (Some(first), Some(last)) = (video.samples.first(), video.samples.last()) {
                video_range = Some((first.dts, last.dts));
            }
            self.remux_video(video, false)?;
        }
        if let Some(audio) = audio {
            self.remux_audio(audio, false)?;
        }
        if self.silent_audio_mode {
            if let Some((first, last)) = video_range {
                self.generate_silent_audio(first, last)?;
            }
        }
        Ok(())
    }

    /// Emits the samples held back from the last batches, e.g. at the end
    /// of the stream.
    pub fn flush_stashed_samples(&mut self) -> Result<()> {
        let mut video = VideoTrack::new(TrackType::Video, 1);
        if let Some(sample) = self.video_stashed_last_sample.take() {
            video.push(sample);
        }
        let mut audio = AudioTrack::new(TrackType::Audio, 2);
        if let Some(sample) = self.audio_stashed_last_sample.take() {
            audio.push(sample);
        }
        self.remux_video(&mut video, true)?;
        self.remux_audio(&mut audio, true)
    }

    fn calculate_dts_base(&mut self, audio: Option<&AudioTrack>, video: Option<&VideoTrack>) {
        let audio_base = audio.and_then(|t| t.samples.first()).map(|s| s.dts);
        let video_base = video.and_then(|t| t.samples.first()).map(|s| s.dts);

        let base = if self.silent_audio_mode {
            video_base
        } else {
            match (audio_base, video_base) {
                (Some(a), Some(v)) => Some(a.min(v)),
                (a, v) => a.or(v),
            }
        };
        if let Some(base) = base {
            self.dts_base = base;
            self.dts_base_inited = true;
        }
    }

    /// Offset between the first sample of a batch and where the previous
    /// segment on the timeline ended.
    fn continuation_correction(timeline: &MediaSegmentInfoList, first_dts: i64) -> i64 {
        match timeline.get_last_sample_before(first_dts) {
            Some(last) => {
                let mut gap = first_dts - (last.original_dts + last.duration);
                if gap <= CONTINUATION_TOLERANCE_MS {
                    gap = 0;
                }
                first_dts - (last.dts + last.duration + gap)
            }
            None => 0,
        }
    }

    fn remux_audio(&mut self, track: &mut AudioTrack, force: bool) -> Result<()> {
        let Some(meta) = self.audio_meta.as_ref() else {
            return Ok(());
        };
        let ref_duration = meta.ref_sample_duration;
        let is_mp3 = meta.codec == "mp3";
        let mp3_raw = is_mp3 && self.config.mp3_use_mpeg_audio;
        let original_codec = meta.original_codec.clone();
        let channel_count = meta.channel_count;
        let first_after_discontinuity = self.dts_base_inited && self.audio_next_dts.is_none();

        if track.samples.is_empty() || (track.samples.len() == 1 && !force) {
            return Ok(());
        }
        let mut samples = std::mem::take(&mut track.samples);
        track.length = 0;

        let next_stash = if samples.len() > 1 { samples.pop() } else { None };
        if let Some(stashed) = self.audio_stashed_last_sample.take() {
            samples.insert(0, stashed);
        }
        let stash_dts = next_stash.as_ref().map(|s| s.dts);
        self.audio_stashed_last_sample = next_stash;

        let base = self.dts_base;
        let first_dts = samples[0].dts - base;
        let mut insert_prefix_silent = false;
        let mut dts_correction = match self.audio_next_dts {
            Some(next) => first_dts as f64 - next,
            None if self.audio_timeline.is_empty() => {
                insert_prefix_silent = self.config.fill_silent_after_seek
                    && !self.video_timeline.is_empty()
                    && original_codec != "mp3";
                0.0
            }
            None => Self::continuation_correction(&self.audio_timeline, first_dts) as f64,
        };

        if insert_prefix_silent {
            let target = first_dts as f64 - dts_correction;
            if let Some(segment) = self.video_timeline.get_last_segment_before(first_dts) {
                if (segment.begin_dts as f64) < target {
                    if let Some(frame) = silent_frame(&original_codec, channel_count) {
                        debug!(
                            "Inserting prefix silent audio, dts: {}, duration: {}",
                            segment.begin_dts,
                            target - segment.begin_dts as f64
                        );
                        samples.insert(0, AudioSample::new(frame, segment.begin_dts + base));
                    }
                }
            }
        }

        let mut output: Vec<OutputSample> = Vec::with_capacity(samples.len());
        let mut payload = BytesMut::new();
        let count = samples.len();

        for (i, sample) in samples.iter().enumerate() {
            let original_dts = (sample.dts - base) as f64;
            if original_dts < -0.001 {
                continue;
            }

            let mut silent_frames: Vec<OutputSample> = Vec::new();
            let mut silent_unit = Bytes::new();
            let dts: f64;
            let duration: f64;

            match ref_duration.filter(|_| !is_mp3) {
                Some(ref_duration) => {
                    let mut cur_ref_dts = self.audio_next_dts.unwrap_or(original_dts);
                    dts_correction = original_dts - cur_ref_dts;

                    if dts_correction <= -AUDIO_DRIFT_THRESHOLD * ref_duration {
                        warn!(
                            "Dropping 1 audio frame (original dts: {} ms, expected: {} ms) due to {} ms overlap",
                            original_dts, cur_ref_dts, dts_correction
                        );
                        continue;
                    }

                    let large_gap = dts_correction >= AUDIO_DRIFT_THRESHOLD * ref_duration;
                    if large_gap && !self.config.fix_audio_timestamp_gap {
                        cur_ref_dts = original_dts;
                    }
                    dts = cur_ref_dts.floor();
                    duration = (cur_ref_dts + ref_duration).floor() - dts;

                    if large_gap && self.config.fix_audio_timestamp_gap {
                        let frame_count = (dts_correction / ref_duration).floor() as usize;
                        warn!(
                            "Large audio timestamp gap (original dts: {} ms, expected: {} ms, gap: {} ms), generating {} silent frames",
                            original_dts,
                            cur_ref_dts,
                            dts_correction.round(),
                            frame_count
                        );
                        silent_unit = match silent_frame(&original_codec, channel_count) {
                            Some(frame) => Bytes::from(frame),
                            None => {
                                warn!(
                                    "No silent frame for {} with {} channels, repeating last frame",
                                    original_codec, channel_count
                                );
                                sample.unit.clone()
                            }
                        };
                        for _ in 0..frame_count {
                            cur_ref_dts += ref_duration;
                            let silent_dts = cur_ref_dts.floor();
                            let silent_duration = (cur_ref_dts + ref_duration).floor() - silent_dts;
                            silent_frames.push(OutputSample::audio(
                                silent_dts as i64,
                                silent_duration as i64,
                                original_dts as i64,
                                silent_unit.len(),
                            ));
                        }
                    }
                    self.audio_next_dts = Some(cur_ref_dts + ref_duration);
                }
                None => {
                    dts = original_dts - dts_correction;
                    duration = if i + 1 < count {
                        (samples[i + 1].dts - base) as f64 - dts_correction - dts
                    } else if let Some(stash_dts) = stash_dts {
                        (stash_dts - base) as f64 - dts_correction - dts
                    } else if let Some(previous) = output.last() {
                        previous.duration as f64
                    } else {
                        ref_duration.unwrap_or(0.0).floor()
                    };
                    self.audio_next_dts = Some(dts + duration);
                }
            }

            output.push(OutputSample::audio(
                dts as i64,
                duration as i64,
                original_dts as i64,
                sample.unit.len(),
            ));
            payload.put_slice(&sample.unit);
            for silent in silent_frames {
                payload.put_slice(&silent_unit);
                output.push(silent);
            }
        }

        let (Some(first), Some(last)) = (output.first(), output.last()) else {
            return Ok(());
        };

        let info = SegmentInfo {
            begin_dts: first.dts,
            end_dts: last.dts + last.duration,
            begin_pts: first.dts,
            end_pts: last.dts + last.duration,
            original_begin_dts: first.original_dts,
            original_end_dts: last.original_dts + last.duration,
            sync_points: Vec::new(),
            first_sample: Some(first.info()),
            last_sample: Some(last.info()),
        };

        track.sequence_number += 1;
        let data = if mp3_raw {
            payload.freeze()
        } else {
            let fragments: Vec<FragmentSample> = output.iter().map(OutputSample::fragment).collect();
            let mut data = boxes::moof(
                track.sequence_number,
                track.id,
                first.dts.max(0) as u32,
                &fragments,
            );
            data.extend_from_slice(&boxes::mdat(&payload));
            Bytes::from(data)
        };

        let segment = MediaSegment {
            track_type: TrackType::Audio,
            data,
            sample_count: output.len(),
            timestamp_offset: (mp3_raw && first_after_discontinuity).then_some(first.dts),
            info,
        };
        self.emit_media_segment(segment)
    }

    fn remux_video(&mut self, track: &mut VideoTrack, force: bool) -> Result<()> {
        let Some(meta) = self.video_meta.as_ref() else {
            return Ok(());
        };
        let ref_duration = meta.ref_sample_duration;

        if track.samples.is_empty() || (track.samples.len() == 1 && !force) {
            return Ok(());
        }
        let mut samples = std::mem::take(&mut track.samples);
        track.length = 0;

        let next_stash = if samples.len() > 1 { samples.pop() } else { None };
        if let Some(stashed) = self.video_stashed_last_sample.take() {
            samples.insert(0, stashed);
        }
        let stash_dts = next_stash.as_ref().map(|s| s.dts);
        self.video_stashed_last_sample = next_stash;

        let base = self.dts_base;
        let first_dts = samples[0].dts - base;
        let dts_correction = match self.video_next_dts {
            Some(next) => first_dts - next,
            None => Self::continuation_correction(&self.video_timeline, first_dts),
        };

        let mut info = SegmentInfo::default();
        let mut output: Vec<OutputSample> = Vec::with_capacity(samples.len());
        let mut payload = BytesMut::with_capacity(samples.iter().map(|s| s.length).sum());

        for (i, sample) in samples.iter().enumerate() {
            let original_dts = sample.dts - base;
            let dts = original_dts - dts_correction;
            let pts = dts + sample.cts;

            let duration = if i + 1 < samples.len() {
                samples[i + 1].dts - base - dts_correction - dts
            } else if let Some(stash_dts) = stash_dts {
                stash_dts - base - dts_correction - dts
            } else if let Some(previous) = output.last() {
                previous.duration
            } else {
                ref_duration.floor() as i64
            };

            if sample.is_keyframe {
                let mut sync_point = SampleInfo::new(dts, pts, duration, original_dts, true);
                sync_point.file_position = sample.file_position;
                info.append_sync_point(sync_point);
            }

            output.push(OutputSample {
                dts,
                pts,
                cts: sample.cts,
                duration,
                original_dts,
                size: sample.length,
                is_keyframe: sample.is_keyframe,
                flags: SampleFlags::video(sample.is_keyframe),
            });
            for unit in &sample.units {
                payload.put_slice(&unit.data);
            }
        }

        let (Some(first), Some(last)) = (output.first(), output.last()) else {
            return Ok(());
        };
        self.video_next_dts = Some(last.dts + last.duration);

        info.begin_dts = first.dts;
        info.end_dts = last.dts + last.duration;
        info.begin_pts = first.pts;
        info.end_pts = last.pts + last.duration;
        info.original_begin_dts = first.original_dts;
        info.original_end_dts = last.original_dts + last.duration;
        info.first_sample = Some(first.info());
        info.last_sample = Some(last.info());

        let mut fragments: Vec<FragmentSample> = output.iter().map(OutputSample::fragment).collect();
        if self.config.force_first_idr {
            if let Some(fragment) = fragments.first_mut() {
                fragment.flags.depends_on = 2;
                fragment.flags.is_non_sync = 0;
            }
        }

        track.sequence_number += 1;
        let mut data = boxes::moof(
            track.sequence_number,
            track.id,
            first.dts.max(0) as u32,
            &fragments,
        );
        data.extend_from_slice(&boxes::mdat(&payload));

        let segment = MediaSegment {
            track_type: TrackType::Video,
            data: Bytes::from(data),
            sample_count: output.len(),
            info,
            timestamp_offset: None,
        };
        self.emit_media_segment(segment)
    }

    /// Fills the audio track with silence up to the end of the video batch
    /// while the real audio is decoded elsewhere.
    fn generate_silent_audio(&mut self, video_first_dts: i64, video_last_dts: i64) -> Result<()> {
        let Some(meta) = self.audio_meta.as_ref() else {
            return Ok(());
        };
        let sample_rate = if meta.sample_rate > 0 { meta.sample_rate } else { 48000 };
        let channel_count = if meta.channel_count > 0 { meta.channel_count } else { 2 };
        let ref_duration = 1024.0 / sample_rate as f64 * 1000.0;
        let codec = if meta.original_codec.is_empty() {
            "mp4a.40.2"
        } else {
            meta.original_codec.as_str()
        };
        let Some(frame) = silent_frame(codec, channel_count) else {
            return Ok(());
        };
        let track_id = meta.id;

        let end_dts = (video_last_dts - self.dts_base) as f64;
        let mut cur_dts = self
            .silent_audio_last_dts
            .unwrap_or((video_first_dts - self.dts_base) as f64);

        let mut output = Vec::new();
        let mut payload = BytesMut::new();
        while cur_dts < end_dts {
            let dts = cur_dts.floor();
            let duration = (cur_dts + ref_duration).floor() - dts;
            output.push(OutputSample::audio(
                dts as i64,
                duration as i64,
                dts as i64,
                frame.len(),
            ));
            payload.put_slice(&frame);
            cur_dts += ref_duration;
        }
        self.silent_audio_last_dts = Some(cur_dts);

        let (Some(first), Some(last)) = (output.first(), output.last()) else {
            return Ok(());
        };

        let sequence_number = self.silent_sequence_number;
        self.silent_sequence_number += 1;
        let fragments: Vec<FragmentSample> = output.iter().map(OutputSample::fragment).collect();
        let mut data = boxes::moof(sequence_number, track_id, first.dts.max(0) as u32, &fragments);
        data.extend_from_slice(&boxes::mdat(&payload));

        let info = SegmentInfo {
            begin_dts: first.dts,
            end_dts: last.dts + last.duration,
            begin_pts: first.dts,
            end_pts: last.dts + last.duration,
            original_begin_dts: first.dts,
            original_end_dts: last.dts + last.duration,
            sync_points: Vec::new(),
            first_sample: Some(first.info()),
            last_sample: Some(last.info()),
        };
        let segment = MediaSegment {
            track_type: TrackType::Audio,
            data: Bytes::from(data),
            sample_count: output.len(),
            info,
            timestamp_offset: None,
        };
        self.emit_media_segment(segment)
    }

    fn emit_media_segment(&mut self, segment: MediaSegment) -> Result<()> {
        if !self.config.is_live {
            match segment.track_type {
                TrackType::Audio => self.audio_timeline.append(segment.info.clone()),
                TrackType::Video => self.video_timeline.append(segment.info.clone()),
            }
        }
        let listener = self.listener.as_mut().ok_or_else(|| {
            RemuxError::Precondition("MP4Remuxer: media segment listener must be set".into())
        })?;
        listener.on_media_segment(segment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{NalUnit, VideoConfig};
    use crate::codec::{FrameRate, Size};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Default)]
    struct Collected {
        init: Vec<InitSegment>,
        media: Vec<MediaSegment>,
    }

    struct Collector(Arc<Mutex<Collected>>);

    impl RemuxListener for Collector {
        fn on_init_segment(&mut self, segment: InitSegment) {
            self.0.lock().init.push(segment);
        }

        fn on_media_segment(&mut self, segment: MediaSegment) {
            self.0.lock().media.push(segment);
        }
    }

    fn remuxer(config: RemuxConfig) -> (MP4Remuxer, Arc<Mutex<Collected>>) {
        let collected = Arc::new(Mutex::new(Collected::default()));
        let mut remuxer = MP4Remuxer::new(config);
        remuxer.set_listener(Box::new(Collector(collected.clone())));
        (remuxer, collected)
    }

    fn aac_meta(ref_duration: f64) -> TrackMetadata {
        TrackMetadata::Audio(AudioMetadata {
            id: 2,
            timescale: 1000,
            duration: 0,
            sample_rate: 48000,
            channel_count: 2,
            channel_config_code: None,
            codec: "mp4a.40.2".into(),
            original_codec: "mp4a.40.2".into(),
            config: Some(vec![0x11, 0x90]),
            ref_sample_duration: Some(ref_duration),
            silent_audio_mode: false,
        })
    }

    fn avc_meta() -> TrackMetadata {
        TrackMetadata::Video(VideoMetadata {
            id: 1,
            timescale: 1000,
            duration: 0,
            codec_width: 640,
            codec_height: 360,
            present_width: 640,
            present_height: 360,
            profile: "Baseline".into(),
            level: "3.0".into(),
            bit_depth: 8,
            chroma_format: 1,
            sar_ratio: Size::new(1, 1),
            frame_rate: FrameRate::default(),
            ref_sample_duration: 40.0,
            codec: "avc1.42c01e".into(),
            config: VideoConfig::Avc(vec![0x01, 0x42, 0xC0, 0x1E]),
        })
    }

    fn audio_track(dts: &[i64]) -> AudioTrack {
        let mut track = AudioTrack::new(TrackType::Audio, 2);
        for &d in dts {
            track.push(AudioSample::new(vec![0xAB; 4], d));
        }
        track
    }

    fn video_track(frames: &[(i64, bool)]) -> VideoTrack {
        let mut track = VideoTrack::new(TrackType::Video, 1);
        for &(dts, key) in frames {
            let unit = NalUnit::new(if key { 5 } else { 1 }, vec![0, 0, 0, 2, 0x65, 0x00]);
            track.push(VideoSample::new(vec![unit], dts, dts).with_keyframe(key));
        }
        track
    }

    fn dts_list(segment: &MediaSegment) -> (i64, i64) {
        (segment.info.begin_dts, segment.info.end_dts)
    }

    #[test]
    fn test_missing_listener_is_precondition_error() {
        let mut remuxer = MP4Remuxer::new(RemuxConfig::default());
        assert!(matches!(
            remuxer.on_track_metadata(avc_meta()),
            Err(RemuxError::Precondition(_))
        ));
        let mut track = audio_track(&[0, 20]);
        assert!(matches!(
            remuxer.remux(Some(&mut track), None),
            Err(RemuxError::Precondition(_))
        ));
    }

    #[test]
    fn test_init_segment_events() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();

        let mut mp3 = match aac_meta(0.0) {
            TrackMetadata::Audio(meta) => meta,
            _ => unreachable!(),
        };
        mp3.codec = "mp3".into();
        mp3.original_codec = "mp3".into();
        mp3.ref_sample_duration = None;
        remuxer.on_track_metadata(TrackMetadata::Audio(mp3)).unwrap();

        let collected = collected.lock();
        assert_eq!(collected.init.len(), 2);
        assert_eq!(collected.init[0].container, "video/mp4");
        assert_eq!(collected.init[0].codec, "avc1.42c01e");
        assert_eq!(&collected.init[0].data[4..8], b"ftyp");
        assert_eq!(collected.init[1].container, "audio/mpeg");
        assert!(collected.init[1].data.is_empty());
    }

    #[test]
    fn test_last_sample_is_stashed_until_next_batch() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();

        let mut track = video_track(&[(1000, true), (1040, false), (1080, false)]);
        remuxer.remux(None, Some(&mut track)).unwrap();
        assert!(track.is_empty());
        {
            let collected = collected.lock();
            assert_eq!(collected.media.len(), 1);
            assert_eq!(collected.media[0].sample_count, 2);
            assert_eq!(dts_list(&collected.media[0]), (0, 80));
            assert_eq!(collected.media[0].info.sync_points.len(), 1);
        }

        let mut track = video_track(&[(1120, false), (1160, false)]);
        remuxer.remux(None, Some(&mut track)).unwrap();
        let collected = collected.lock();
        assert_eq!(collected.media[1].sample_count, 2);
        assert_eq!(dts_list(&collected.media[1]), (80, 160));
        assert_eq!(remuxer.get_timestamp_base(), Some(1000));
    }

    #[test]
    fn test_single_sample_waits_unless_forced() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();

        let mut track = video_track(&[(0, true)]);
        remuxer.remux(None, Some(&mut track)).unwrap();
        assert_eq!(track.samples.len(), 1);
        assert!(collected.lock().media.is_empty());

        track.push(VideoSample::new(vec![], 40, 40));
        remuxer.remux(None, Some(&mut track)).unwrap();
        remuxer.flush_stashed_samples().unwrap();

        let collected = collected.lock();
        assert_eq!(collected.media.len(), 2);
        // nothing follows the flushed sample, so it gets the reference duration
        assert_eq!(dts_list(&collected.media[1]), (40, 80));
    }

    #[test]
    fn test_audio_gap_is_filled_with_silence() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(aac_meta(20.0)).unwrap();

        let mut track = audio_track(&[0, 20, 40, 60]);
        remuxer.remux(Some(&mut track), None).unwrap();
        let mut track = audio_track(&[160, 180, 200]);
        remuxer.remux(Some(&mut track), None).unwrap();

        let collected = collected.lock();
        assert_eq!(collected.media.len(), 2);
        assert_eq!(collected.media[0].sample_count, 3);

        // 60 and 160 carried over, 160 realigned to 80, four silent frames
        // bridge 100..160, then 180.
        let second = &collected.media[1];
        assert_eq!(second.sample_count, 3 + 4);
        assert_eq!(dts_list(second), (60, 200));
        assert_eq!(remuxer.audio_timeline().len(), 2);
    }

    #[test]
    fn test_audio_gap_passes_through_when_disabled() {
        let config = RemuxConfig {
            fix_audio_timestamp_gap: false,
            ..Default::default()
        };
        let (mut remuxer, collected) = remuxer(config);
        remuxer.on_track_metadata(aac_meta(20.0)).unwrap();

        let mut track = audio_track(&[0, 20, 40, 60]);
        remuxer.remux(Some(&mut track), None).unwrap();
        let mut track = audio_track(&[160, 180, 200]);
        remuxer.remux(Some(&mut track), None).unwrap();

        let collected = collected.lock();
        assert_eq!(collected.media[1].sample_count, 3);
        assert_eq!(collected.media[1].info.last_sample.unwrap().dts, 180);
    }

    #[test]
    fn test_overlapping_audio_frame_is_dropped() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(aac_meta(20.0)).unwrap();

        let mut track = audio_track(&[0, 20, 40, 60, 80, 100, 0, 120]);
        remuxer.remux(Some(&mut track), None).unwrap();

        let collected = collected.lock();
        // the late frame at 0 is more than three frames behind and dropped
        assert_eq!(collected.media[0].sample_count, 6);
        assert_eq!(dts_list(&collected.media[0]), (0, 120));
    }

    #[test]
    fn test_discontinuity_realigns_through_timeline() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();

        let mut track = video_track(&[(0, true), (40, false), (80, false)]);
        remuxer.remux(None, Some(&mut track)).unwrap();
        remuxer.insert_discontinuity();

        let mut track = video_track(&[(82, true), (122, false), (162, false)]);
        remuxer.remux(None, Some(&mut track)).unwrap();

        let collected = collected.lock();
        // the stashed frame at 80 leads the second fragment, continuing at 80
        assert_eq!(collected.media[1].info.begin_dts, 80);
    }

    #[test]
    fn test_seek_clears_timelines() {
        let (mut remuxer, _collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();
        let mut track = video_track(&[(0, true), (40, false), (80, false)]);
        remuxer.remux(None, Some(&mut track)).unwrap();
        assert_eq!(remuxer.video_timeline().len(), 1);

        remuxer.seek();
        assert!(remuxer.video_timeline().is_empty());
        assert!(remuxer.video_stashed_last_sample.is_none());
    }

    #[test]
    fn test_live_mode_keeps_no_timeline() {
        let config = RemuxConfig {
            is_live: true,
            ..Default::default()
        };
        let (mut remuxer, collected) = remuxer(config);
        remuxer.on_track_metadata(avc_meta()).unwrap();
        let mut track = video_track(&[(0, true), (40, false), (80, false)]);
        remuxer.remux(None, Some(&mut track)).unwrap();

        assert_eq!(collected.lock().media.len(), 1);
        assert!(remuxer.video_timeline().is_empty());
    }

    #[test]
    fn test_dts_base_is_minimum_of_tracks() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();
        remuxer.on_track_metadata(aac_meta(20.0)).unwrap();

        let mut audio = audio_track(&[980, 1000, 1020]);
        let mut video = video_track(&[(1000, true), (1040, false), (1080, false)]);
        remuxer.remux(Some(&mut audio), Some(&mut video)).unwrap();

        assert_eq!(remuxer.get_timestamp_base(), Some(980));
        let collected = collected.lock();
        assert_eq!(collected.media[0].track_type, TrackType::Video);
        assert_eq!(collected.media[0].info.begin_dts, 20);
        assert_eq!(collected.media[1].track_type, TrackType::Audio);
        assert_eq!(collected.media[1].info.begin_dts, 0);
    }

    #[test]
    fn test_silent_audio_mode_covers_video() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        remuxer.on_track_metadata(avc_meta()).unwrap();
        let mut meta = match aac_meta(1024.0 / 48.0) {
            TrackMetadata::Audio(meta) => meta,
            _ => unreachable!(),
        };
        meta.silent_audio_mode = true;
        remuxer.on_track_metadata(TrackMetadata::Audio(meta)).unwrap();

        let mut video = video_track(&[(0, true), (40, false), (80, false), (120, false)]);
        remuxer.remux(None, Some(&mut video)).unwrap();

        let collected = collected.lock();
        assert_eq!(collected.media.len(), 2);
        let silent = &collected.media[1];
        assert_eq!(silent.track_type, TrackType::Audio);
        // 0 .. 120 in 21.333 ms steps
        assert_eq!(silent.sample_count, 6);
        assert_eq!(silent.info.begin_dts, 0);
    }

    #[test]
    fn test_mp3_raw_segments_carry_timestamp_offset() {
        let (mut remuxer, collected) = remuxer(RemuxConfig::default());
        let mut meta = match aac_meta(0.0) {
            TrackMetadata::Audio(meta) => meta,
            _ => unreachable!(),
        };
        meta.codec = "mp3".into();
        meta.original_codec = "mp3".into();
        meta.ref_sample_duration = None;
        remuxer.on_track_metadata(TrackMetadata::Audio(meta)).unwrap();

        let mut track = audio_track(&[0, 26, 52]);
        remuxer.remux(Some(&mut track), None).unwrap();
        let mut track = audio_track(&[78, 104]);
        remuxer.remux(Some(&mut track), None).unwrap();

        let collected = collected.lock();
        assert_eq!(collected.media[0].timestamp_offset, Some(0));
        // raw frames, no boxes
        assert_eq!(collected.media[0].data.len(), 8);
        assert_eq!(collected.media[1].timestamp_offset, None);
        assert_eq!(dts_list(&collected.media[1]), (52, 104));
    }
}
