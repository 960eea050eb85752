use std::collections::HashMap;

use bytes::Bytes;
use log::{debug, error, info, trace, warn};

use super::parser::{self, PmtStream, ProbeData, ProbeResult};
use super::pes;
use super::types::*;
use crate::av::{
    AudioMetadata, AudioSample, AudioTrack, DemuxListener, KlvData, MediaInfo, NalUnit,
    PesPrivateData, PesPrivateDataDescriptor, PgsSubtitleData, RawAudioFrame, Scte35Metadata,
    Smpte2038Data, TrackMetadata, TrackType, VideoConfig, VideoMetadata, VideoSample, VideoTrack,
};
use crate::codec::aac::{AdtsParser, AudioSpecificConfig, LoasParser, SAMPLING_FREQUENCIES};
use crate::codec::ac3::{build_dac3, Ac3Parser};
use crate::codec::annexb::{length_prefixed, AnnexBReader};
use crate::codec::eac3::{build_dec3, Eac3Parser};
use crate::codec::{h264, h265, klv, mpeg_audio, opus, scte35, smpte2038};
use crate::codec::{AacFrame, Ac3Frame, Eac3Frame, FrameRate, MpegAudioHeader, OpusConfig, Size};
use crate::config::DemuxConfig;
use crate::error::{RemuxError, Result};
use crate::utils::Crc32Mpeg2;

/// 90 kHz ticks per millisecond.
const TICKS_PER_MS: u64 = 90;
const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;
/// Frame duration assumed when the SPS carries no timing info (23.976 fps).
const DEFAULT_VIDEO_SAMPLE_DURATION: f64 = 1000.0 * 1001.0 / 24000.0;

fn to_ms(ticks: u64) -> i64 {
    (ticks / TICKS_PER_MS) as i64
}

/// Milliseconds covered by `samples` audio samples at `rate`.
fn samples_duration(samples: f64, rate: u32) -> Option<f64> {
    (rate > 0).then(|| samples / rate as f64 * 1000.0)
}

/// Configuration of the audio track as last announced.
#[derive(Debug, Clone)]
enum AudioConfig {
    Aac(AacFrame),
    Ac3(Ac3Frame),
    Eac3(Eac3Frame),
    Opus(OpusConfig),
    Mp3(MpegAudioHeader),
}

impl AudioConfig {
    fn codec(&self) -> &'static str {
        match self {
            AudioConfig::Aac(_) => "aac",
            AudioConfig::Ac3(_) => "ac-3",
            AudioConfig::Eac3(_) => "ec-3",
            AudioConfig::Opus(_) => "opus",
            AudioConfig::Mp3(_) => "mp3",
        }
    }

    /// Nominal frame duration in milliseconds.
    fn frame_duration(&self) -> Option<f64> {
        match self {
            AudioConfig::Aac(frame) => samples_duration(1024.0, frame.sampling_frequency),
            AudioConfig::Ac3(frame) => samples_duration(1536.0, frame.sampling_frequency),
            AudioConfig::Eac3(frame) => {
                samples_duration(256.0 * frame.num_blks as f64, frame.sampling_frequency)
            }
            AudioConfig::Opus(_) => Some(opus::FRAME_DURATION_MS),
            AudioConfig::Mp3(_) => None,
        }
    }

    fn differs(&self, other: &AudioConfig) -> bool {
        match (self, other) {
            (AudioConfig::Aac(a), AudioConfig::Aac(b)) => a.config_differs(b),
            (AudioConfig::Ac3(a), AudioConfig::Ac3(b)) => a.config_differs(b),
            (AudioConfig::Eac3(a), AudioConfig::Eac3(b)) => a.config_differs(b),
            (AudioConfig::Opus(a), AudioConfig::Opus(b)) => a.config_differs(b),
            (AudioConfig::Mp3(a), AudioConfig::Mp3(b)) => a.config_differs(b),
            _ => true,
        }
    }
}

/// The SPS fields shared by H.264 and H.265 that describe the video track.
#[derive(Debug, Clone, PartialEq)]
struct VideoDetails {
    codec_mimetype: String,
    profile_string: String,
    level_string: String,
    bit_depth: u8,
    chroma_format: u32,
    chroma_format_string: String,
    ref_frames: u32,
    frame_rate: FrameRate,
    sar_ratio: Size,
    codec_size: Size,
    present_size: Size,
}

impl From<&h264::SpsInfo> for VideoDetails {
    fn from(sps: &h264::SpsInfo) -> Self {
        Self {
            codec_mimetype: sps.codec_mimetype.clone(),
            profile_string: sps.profile_string.clone(),
            level_string: sps.level_string.clone(),
            bit_depth: sps.bit_depth(),
            chroma_format: sps.chroma_format,
            chroma_format_string: sps.chroma_format_string.clone(),
            ref_frames: sps.ref_frames,
            frame_rate: sps.frame_rate.clone(),
            sar_ratio: sps.sar_ratio,
            codec_size: sps.codec_size,
            present_size: sps.present_size,
        }
    }
}

impl From<&h265::SpsInfo> for VideoDetails {
    fn from(sps: &h265::SpsInfo) -> Self {
        Self {
            codec_mimetype: sps.codec_mimetype.clone(),
            profile_string: sps.profile_string.clone(),
            level_string: sps.level_string.clone(),
            bit_depth: sps.bit_depth(),
            chroma_format: match sps.chroma_format_idc {
                1 => 420,
                2 => 422,
                3 => 444,
                _ => 0,
            },
            chroma_format_string: sps.chroma_format_string.clone(),
            ref_frames: sps.ref_frames,
            frame_rate: sps.frame_rate.clone(),
            sar_ratio: sps.sar_ratio,
            codec_size: sps.codec_size,
            present_size: sps.present_size,
        }
    }
}

/// Parameter sets of the current video configuration. NAL units are kept
/// with their header and without start code.
#[derive(Debug, Default)]
struct VideoParameterSets {
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    av1c: Option<Bytes>,
    details: Option<VideoDetails>,
    avc_sps: Option<h264::SpsInfo>,
    hevc_vps: Option<h265::VpsInfo>,
    hevc_sps: Option<h265::SpsInfo>,
    hevc_pps: Option<h265::PpsInfo>,
}

/// MPEG-TS demuxer.
///
/// Feed it consecutive chunks with [`TSDemuxer::parse_chunks`]; it
/// reassembles PSI sections and PES packets, splits elementary streams into
/// samples and reports everything through a [`DemuxListener`]. Audio and
/// video samples are handed over once the init segments of every track the
/// PMT announces have been dispatched.
pub struct TSDemuxer {
    config: DemuxConfig,
    listener: Option<Box<dyn DemuxListener>>,

    ts_packet_size: usize,
    sync_offset: usize,
    first_parse: bool,

    pat: Option<Pat>,
    current_program: Option<u16>,
    current_pmt_pid: Option<u16>,
    program_pmt_map: HashMap<u16, Pmt>,

    section_queues: HashMap<u16, SliceQueue>,
    pes_queues: HashMap<u16, SliceQueue>,

    has_video: bool,
    has_audio: bool,
    video_init_segment_dispatched: bool,
    audio_init_segment_dispatched: bool,
    video_metadata_changed: bool,
    video_params: VideoParameterSets,
    audio_config: Option<AudioConfig>,
    /// Set once MPEG Layer II is routed to the raw audio hook.
    soft_decode_audio_codec: Option<&'static str>,
    media_info: MediaInfo,

    /// Added to every timestamp: the configured base plus 2^33 per PCR wrap.
    timestamp_offset: u64,
    last_pcr_base: Option<u64>,
    last_pcr: Option<u64>,
    audio_last_sample_pts: Option<f64>,
    aac_last_incomplete_data: Option<Bytes>,
    ac3_last_incomplete_data: Option<Bytes>,
    eac3_last_incomplete_data: Option<Bytes>,
    loas_previous_frame: Option<AacFrame>,

    video_track: VideoTrack,
    audio_track: AudioTrack,
}

impl TSDemuxer {
    pub fn new(probe: ProbeData, config: DemuxConfig) -> Self {
        let mut demuxer = Self {
            ts_packet_size: probe.ts_packet_size,
            sync_offset: probe.sync_offset,
            first_parse: true,
            listener: None,
            pat: None,
            current_program: None,
            current_pmt_pid: None,
            program_pmt_map: HashMap::new(),
            section_queues: HashMap::new(),
            pes_queues: HashMap::new(),
            has_video: false,
            has_audio: false,
            video_init_segment_dispatched: false,
            audio_init_segment_dispatched: false,
            video_metadata_changed: false,
            video_params: VideoParameterSets::default(),
            audio_config: None,
            soft_decode_audio_codec: None,
            media_info: MediaInfo::new(),
            timestamp_offset: 0,
            last_pcr_base: None,
            last_pcr: None,
            audio_last_sample_pts: None,
            aac_last_incomplete_data: None,
            ac3_last_incomplete_data: None,
            eac3_last_incomplete_data: None,
            loas_previous_frame: None,
            video_track: VideoTrack::new(TrackType::Video, VIDEO_TRACK_ID),
            audio_track: AudioTrack::new(TrackType::Audio, AUDIO_TRACK_ID),
            config,
        };
        demuxer.set_timestamp_base(demuxer.config.timestamp_base_seconds);
        demuxer
    }

    /// Detects the TS packet layout of the first bytes of a stream.
    pub fn probe(data: &[u8]) -> ProbeResult {
        parser::probe(data)
    }

    pub fn set_listener(&mut self, listener: Box<dyn DemuxListener>) {
        self.listener = Some(listener);
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    /// Start time of the stream in seconds, added to every timestamp so
    /// that consecutive segments line up.
    pub fn set_timestamp_base(&mut self, seconds: f64) {
        self.timestamp_offset = (seconds.max(0.0) * PTS_HZ as f64) as u64;
    }

    /// Restarts packet alignment after lost sync: the next chunk is parsed
    /// from `probe.sync_offset` on.
    pub fn resync(&mut self, probe: ProbeData) {
        self.ts_packet_size = probe.ts_packet_size;
        self.sync_offset = probe.sync_offset;
        self.first_parse = true;
    }

    pub fn reset_media_info(&mut self) {
        self.media_info.reset();
    }

    /// Drops every buffer and the listener.
    pub fn destroy(&mut self) {
        self.listener = None;
        self.pat = None;
        self.current_program = None;
        self.current_pmt_pid = None;
        self.program_pmt_map.clear();
        self.section_queues.clear();
        self.pes_queues.clear();
        self.video_params = VideoParameterSets::default();
        self.audio_config = None;
        self.aac_last_incomplete_data = None;
        self.ac3_last_incomplete_data = None;
        self.eac3_last_incomplete_data = None;
        self.loas_previous_frame = None;
        self.video_track.clear();
        self.audio_track.clear();
        self.media_info.reset();
    }

    /// Parses every whole packet of `chunk` and returns the number of bytes
    /// consumed. `byte_start` is the stream offset of `chunk[0]`.
    ///
    /// Fails only when no listener is set.
    pub fn parse_chunks(&mut self, chunk: &[u8], byte_start: u64) -> Result<usize> {
        if self.listener.is_none() {
            return Err(RemuxError::Precondition(
                "TSDemuxer: listener must be set before parsing".into(),
            ));
        }

        let prefix = if self.ts_packet_size == M2TS_PACKET_SIZE { 4 } else { 0 };
        let mut offset = 0;
        if self.first_parse {
            self.first_parse = false;
            offset = self.sync_offset;
        }

        while offset + self.ts_packet_size <= chunk.len() {
            let file_position = byte_start + offset as u64;
            let start = offset + prefix;
            let packet = &chunk[start..start + TS_PACKET_SIZE];
            if packet[0] != SYNC_BYTE {
                error!("sync_byte = {}, not 0x47", packet[0]);
                break;
            }
            self.parse_packet(packet, file_position);
            offset += self.ts_packet_size;
        }

        self.dispatch_audio_video_media_segment();
        Ok(offset)
    }

    fn pmt(&self) -> Option<&Pmt> {
        self.current_program
            .and_then(|program| self.program_pmt_map.get(&program))
    }

    fn parse_packet(&mut self, packet: &[u8], file_position: u64) {
        let payload_unit_start = packet[1] & 0x40 != 0;
        let pid = ((packet[1] as u16 & 0x1f) << 8) | packet[2] as u16;
        let adaptation_field_control = (packet[3] & 0x30) >> 4;

        let mut payload_start = 4;
        let mut random_access = false;

        if adaptation_field_control == 2 || adaptation_field_control == 3 {
            let adaptation_field_length = packet[4] as usize;
            let is_pcr_pid = self.pmt().map_or(false, |pmt| pmt.pcr_pid == pid);
            if adaptation_field_length > 0 && (is_pcr_pid || adaptation_field_control == 3) {
                random_access = packet[5] & 0x40 != 0;
                if packet[5] & 0x10 != 0 && adaptation_field_length >= 7 {
                    let base = self.pcr_base(&packet[6..12]);
                    self.last_pcr = Some(base * 300 + parser::parse_pcr_extension(&packet[6..12]));
                }
            }
            if adaptation_field_control == 2 || 5 + adaptation_field_length >= TS_PACKET_SIZE {
                return;
            }
            payload_start = 5 + adaptation_field_length;
        }

        if adaptation_field_control != 1 && adaptation_field_control != 3 {
            return;
        }
        let payload = &packet[payload_start..];

        let is_scte35 = self
            .pmt()
            .map_or(false, |pmt| pmt.scte_35_pids.contains(&pid));
        if pid == PID_PAT || Some(pid) == self.current_pmt_pid || is_scte35 {
            self.handle_section_slice(payload, payload_unit_start, pid);
            return;
        }

        let stream_type = self
            .pmt()
            .filter(|pmt| pmt.is_pes_pid(pid))
            .and_then(|pmt| pmt.pid_stream_type.get(&pid).copied());
        if let Some(stream_type) = stream_type {
            self.handle_pes_slice(
                payload,
                payload_unit_start,
                pid,
                stream_type,
                file_position,
                random_access,
            );
        }
    }

    /// PCR base with the timestamp offset applied. A value more than 2^32
    /// below the previous one is taken as a 33-bit wrap.
    fn pcr_base(&mut self, data: &[u8]) -> u64 {
        let mut base = parser::parse_pcr_base(data) + self.timestamp_offset;
        if let Some(last) = self.last_pcr_base {
            if base + (PTS_WRAP >> 1) < last {
                base += PTS_WRAP;
                self.timestamp_offset += PTS_WRAP;
            }
        }
        self.last_pcr_base = Some(base);
        base
    }

    fn timestamp(&self, raw: u64) -> u64 {
        let mut ts = raw + self.timestamp_offset;
        if let Some(last) = self.last_pcr_base {
            if ts + (PTS_WRAP >> 1) < last {
                ts += PTS_WRAP;
            }
        }
        ts
    }

    /// Last audio pts, or the last PCR, in milliseconds.
    fn nearest_timestamp_ms(&self) -> Option<i64> {
        self.audio_last_sample_pts
            .map(|pts| pts.floor() as i64)
            .or_else(|| self.last_pcr.map(|pcr| to_ms(pcr / 300)))
    }

    #[cfg(test)]
    pub(crate) fn last_pcr(&self) -> Option<u64> {
        self.last_pcr
    }

    fn report_error(&mut self, err: &RemuxError) {
        error!("{}", err);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_error(err.kind(), &err.to_string());
        }
    }

    fn handle_section_slice(&mut self, payload: &[u8], payload_unit_start: bool, pid: u16) {
        if payload.is_empty() {
            return;
        }

        if !payload_unit_start {
            if let Some(mut queue) = self.section_queues.remove(&pid) {
                queue.append_section_bytes(payload);
                if queue.is_complete() {
                    self.emit_section(pid, queue.freeze());
                } else {
                    self.section_queues.insert(pid, queue);
                }
            }
            return;
        }

        let pointer_field = payload[0] as usize;
        if let Some(mut queue) = self.section_queues.remove(&pid) {
            if !queue.is_empty() {
                let end = (1 + pointer_field).min(payload.len());
                queue.append_section_bytes(&payload[1..end]);
                if queue.is_complete() {
                    self.emit_section(pid, queue.freeze());
                } else {
                    debug!("Dropping incomplete section on pid {}", pid);
                }
            }
        }

        let mut offset = 1 + pointer_field;
        while offset < payload.len() && payload[offset] != 0xff {
            let mut queue = SliceQueue::default();
            offset += queue.append_section_bytes(&payload[offset..]);
            if queue.is_complete() {
                self.emit_section(pid, queue.freeze());
            } else {
                self.section_queues.insert(pid, queue);
            }
        }
    }

    fn emit_section(&mut self, pid: u16, section: Bytes) {
        if self.config.verify_section_crc && !Crc32Mpeg2::verify(&section) {
            warn!("CRC32 mismatch, dropping section on pid {}", pid);
            return;
        }

        let result = if pid == PID_PAT {
            self.parse_pat(&section)
        } else if Some(pid) == self.current_pmt_pid {
            self.parse_pmt(&section)
        } else if self
            .pmt()
            .map_or(false, |pmt| pmt.scte_35_pids.contains(&pid))
        {
            self.parse_scte35(pid, &section)
        } else {
            Ok(())
        };

        if let Err(err) = result {
            self.report_error(&err);
        }
    }

    fn parse_pat(&mut self, data: &[u8]) -> Result<()> {
        let section = parser::parse_pat(data)?;
        let first = self.pat.is_none();

        let mut pat = if section.current_next_indicator && section.section_number == 0 {
            if let Some(pat) = &self.pat {
                if pat.version_number == section.version_number {
                    trace!("PAT version {} unchanged", pat.version_number);
                    return Ok(());
                }
            }
            Pat {
                version_number: section.version_number,
                ..Default::default()
            }
        } else {
            match self.pat.take() {
                Some(pat) => pat,
                None => return Ok(()),
            }
        };

        let mut first_program = None;
        for program in &section.programs {
            if program.program_number == 0 {
                pat.network_pid = Some(program.pid);
            } else {
                pat.program_pmt_pid.insert(program.program_number, program.pid);
                first_program.get_or_insert(*program);
            }
        }

        if let Some(program) = first_program {
            self.current_program = Some(program.program_number);
            self.current_pmt_pid = Some(program.pid);
        }
        if first {
            debug!("Parsed first PAT: {:?}", pat);
        }
        self.pat = Some(pat);
        Ok(())
    }

    fn parse_pmt(&mut self, data: &[u8]) -> Result<()> {
        let section = parser::parse_pmt(data)?;
        let program_number = section.program_number;

        let mut pmt = if section.current_next_indicator && section.section_number == 0 {
            if let Some(pmt) = self.program_pmt_map.get(&program_number) {
                if pmt.version_number == section.version_number {
                    trace!("PMT version {} unchanged", pmt.version_number);
                    return Ok(());
                }
            }
            Pmt::new(program_number, section.version_number)
        } else {
            match self.program_pmt_map.remove(&program_number) {
                Some(pmt) => pmt,
                None => return Ok(()),
            }
        };
        pmt.pcr_pid = section.pcr_pid;

        for stream in &section.streams {
            let pid = stream.pid;
            pmt.pid_stream_type.entry(pid).or_insert(stream.stream_type);
            let has_video = pmt.common_pids.video().is_some();
            let has_audio = pmt.common_pids.audio().is_some();

            match stream.stream_type {
                STREAM_TYPE_H264 if !has_video => pmt.common_pids.h264 = Some(pid),
                STREAM_TYPE_H265 if !has_video => pmt.common_pids.h265 = Some(pid),
                STREAM_TYPE_ADTS_AAC if !has_audio => pmt.common_pids.adts_aac = Some(pid),
                STREAM_TYPE_LOAS_AAC if !has_audio => pmt.common_pids.loas_aac = Some(pid),
                STREAM_TYPE_AC3 if !has_audio => pmt.common_pids.ac3 = Some(pid),
                STREAM_TYPE_EAC3 if !has_audio => pmt.common_pids.eac3 = Some(pid),
                STREAM_TYPE_MPEG1_AUDIO | STREAM_TYPE_MPEG2_AUDIO if !has_audio => {
                    pmt.common_pids.mp3 = Some(pid)
                }
                STREAM_TYPE_PES_PRIVATE_DATA => {
                    self.parse_private_data_descriptors(&mut pmt, stream, has_audio)
                }
                STREAM_TYPE_METADATA => parse_metadata_descriptors(&mut pmt, stream),
                STREAM_TYPE_SCTE35 => {
                    pmt.scte_35_pids.insert(pid);
                }
                STREAM_TYPE_PGS => {
                    let lang = parser::descriptors(&stream.es_info)
                        .find(|(tag, _)| *tag == DESCRIPTOR_ISO_639_LANGUAGE)
                        .and_then(|(_, body)| body.get(..3))
                        .map(|code| String::from_utf8_lossy(code).into_owned())
                        .unwrap_or_else(|| "und".to_string());
                    pmt.pgs_langs.insert(pid, lang);
                }
                _ => {}
            }
        }

        if Some(program_number) == self.current_program {
            if self.pmt().is_none() {
                debug!("Parsed first PMT: {:?}", pmt);
            }
            if pmt.common_pids.video().is_some() || pmt.common_pids.av1.is_some() {
                self.has_video = true;
            }
            if pmt.common_pids.audio().is_some() {
                self.has_audio = true;
            }
            self.media_info.has_video = self.has_video;
            self.media_info.has_audio = self.has_audio;
        }
        self.program_pmt_map.insert(program_number, pmt);
        Ok(())
    }

    fn parse_private_data_descriptors(&mut self, pmt: &mut Pmt, stream: &PmtStream, has_audio: bool) {
        let pid = stream.pid;
        pmt.pes_private_data_pids.insert(pid);
        if stream.es_info.is_empty() {
            return;
        }

        for (tag, body) in parser::descriptors(&stream.es_info) {
            match tag {
                DESCRIPTOR_REGISTRATION => match parser::fourcc(body) {
                    Some("VANC") => {
                        pmt.smpte2038_pids.insert(pid);
                    }
                    Some("AC-3") | Some("BSSD") if !has_audio => pmt.common_pids.ac3 = Some(pid),
                    Some("EC-3") if !has_audio => pmt.common_pids.eac3 = Some(pid),
                    Some("AV01") => pmt.common_pids.av1 = Some(pid),
                    Some("Opus") => pmt.common_pids.opus = Some(pid),
                    Some("KLVA") => {
                        pmt.asynchronous_klv_pids.insert(pid);
                    }
                    _ => {}
                },
                DESCRIPTOR_DVB_EXTENSION if pmt.common_pids.opus == Some(pid) => match body {
                    [0x80, channel_config_code, ..] => {
                        let config = OpusConfig::from_channel_config_code(*channel_config_code);
                        self.update_audio_config(AudioConfig::Opus(config));
                    }
                    _ => error!("Not Supported Opus channel count."),
                },
                DESCRIPTOR_AV1_VIDEO if pmt.common_pids.av1 == Some(pid) => {
                    self.video_params.av1c = Some(Bytes::copy_from_slice(body));
                }
                DESCRIPTOR_AC3 | DESCRIPTOR_ATSC_AC3 | DESCRIPTOR_ATSC_AC3_AUDIO_STREAM => {
                    pmt.common_pids.ac3 = Some(pid)
                }
                DESCRIPTOR_EAC3 => pmt.common_pids.eac3 = Some(pid),
                _ => {}
            }
        }

        if let Some(listener) = self.listener.as_mut() {
            listener.on_pes_private_data_descriptor(PesPrivateDataDescriptor {
                pid,
                stream_type: stream.stream_type,
                descriptor: stream.es_info.clone(),
            });
        }
    }

    fn parse_scte35(&mut self, pid: u16, section: &[u8]) -> Result<()> {
        let splice = scte35::parse_scte35(section)?;
        let pts = splice.pts.map(to_ms);
        let nearest_pts = if pts.is_none() {
            self.nearest_timestamp_ms()
        } else {
            None
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_scte35_metadata(Scte35Metadata {
                pid,
                pts,
                nearest_pts,
                splice,
            });
        }
        Ok(())
    }

    fn handle_pes_slice(
        &mut self,
        payload: &[u8],
        payload_unit_start: bool,
        pid: u16,
        stream_type: u8,
        file_position: u64,
        random_access: bool,
    ) {
        let mut queue = self.pes_queues.remove(&pid);

        if payload_unit_start {
            if !pes::has_start_code(payload) {
                error!("Invalid PES packet on pid {}: start code mismatch", pid);
                if let Some(queue) = queue {
                    self.pes_queues.insert(pid, queue);
                }
                return;
            }
            if let Some(previous) = queue.take() {
                // unbounded PES end where the next one starts
                if previous.expected_length == 0 || previous.is_complete() {
                    self.emit_pes(pid, stream_type, previous);
                } else {
                    debug!("Dropping incomplete PES on pid {}", pid);
                }
            }

            let mut next = SliceQueue::new(file_position, random_access);
            if payload.len() >= 6 {
                let packet_length = u16::from_be_bytes([payload[4], payload[5]]) as usize;
                next.expected_length = if packet_length == 0 { 0 } else { packet_length + 6 };
            }
            queue = Some(next);
        }

        let Some(mut queue) = queue else {
            return;
        };
        queue.data.extend_from_slice(payload);

        if queue.expected_length > 0 {
            if queue.is_complete() {
                self.emit_pes(pid, stream_type, queue);
                return;
            }
            if queue.len() > queue.expected_length {
                warn!(
                    "PES overrun on pid {}: {} > {}",
                    pid,
                    queue.len(),
                    queue.expected_length
                );
                return;
            }
        }
        self.pes_queues.insert(pid, queue);
    }

    fn emit_pes(&mut self, pid: u16, stream_type: u8, queue: SliceQueue) {
        let file_position = queue.file_position;
        let random_access = queue.random_access_indicator;
        let data = queue.freeze();

        let header = match pes::parse_pes_header(&data) {
            Ok(header) => header,
            Err(err) => {
                error!("{}", err);
                return;
            }
        };
        let payload = data.slice(header.payload_offset..header.payload_offset + header.payload_length);
        let stream_id = header.stream_id;

        if pes::is_headerless_stream(stream_id) {
            if stream_id != pes::STREAM_ID_PADDING && stream_type == STREAM_TYPE_PES_PRIVATE_DATA {
                self.dispatch_pes_private_data(pid, stream_id, None, None, payload);
            }
            return;
        }

        let pts = header.pts.map(|ts| self.timestamp(ts));
        let dts = header.dts.map(|ts| self.timestamp(ts));

        let Some(pmt) = self.pmt() else {
            return;
        };
        let common = pmt.common_pids;
        let is_async_klv = pmt.asynchronous_klv_pids.contains(&pid);
        let is_smpte2038 = pmt.smpte2038_pids.contains(&pid);
        let is_timed_id3 = pmt.timed_id3_pids.contains(&pid);
        let is_sync_klv = pmt.synchronous_klv_pids.contains(&pid);
        let pgs_lang = pmt.pgs_langs.get(&pid).cloned();

        match stream_type {
            STREAM_TYPE_MPEG1_AUDIO | STREAM_TYPE_MPEG2_AUDIO => self.parse_mp3_payload(payload, pts),
            STREAM_TYPE_PES_PRIVATE_DATA => {
                if common.av1 == Some(pid) {
                    // no OBU parser, the pid only marks the program as video
                } else if common.opus == Some(pid) {
                    self.parse_opus_payload(&payload, pts);
                } else if common.ac3 == Some(pid) {
                    self.parse_ac3_payload(&payload, pts);
                } else if common.eac3 == Some(pid) {
                    self.parse_eac3_payload(&payload, pts);
                } else if is_async_klv {
                    if let Some(listener) = self.listener.as_mut() {
                        listener.on_asynchronous_klv_metadata(PesPrivateData {
                            pid,
                            stream_id,
                            pts: None,
                            dts: None,
                            nearest_pts: None,
                            len: payload.len(),
                            data: payload,
                        });
                    }
                } else if is_smpte2038 {
                    self.parse_smpte2038_payload(pid, stream_id, pts, dts, payload);
                } else {
                    self.dispatch_pes_private_data(pid, stream_id, pts, dts, payload);
                }
            }
            STREAM_TYPE_ADTS_AAC => self.parse_adts_aac_payload(&payload, pts),
            STREAM_TYPE_LOAS_AAC => self.parse_loas_aac_payload(&payload, pts),
            STREAM_TYPE_AC3 => self.parse_ac3_payload(&payload, pts),
            STREAM_TYPE_EAC3 => self.parse_eac3_payload(&payload, pts),
            STREAM_TYPE_METADATA => {
                if is_timed_id3 {
                    self.dispatch_timed_id3(pid, stream_id, pts, dts, payload);
                } else if is_sync_klv {
                    self.dispatch_synchronous_klv(pid, stream_id, pts, dts, payload);
                }
            }
            STREAM_TYPE_PGS => {
                if let Some(lang) = pgs_lang {
                    if let Some(listener) = self.listener.as_mut() {
                        listener.on_pgs_subtitle_data(PgsSubtitleData {
                            pid,
                            stream_id,
                            lang,
                            pts: pts.map(to_ms),
                            dts: dts.map(to_ms),
                            len: payload.len(),
                            data: payload,
                        });
                    }
                }
            }
            STREAM_TYPE_H264 => {
                self.parse_h264_payload(&payload, pts, dts, file_position, random_access)
            }
            STREAM_TYPE_H265 => {
                self.parse_h265_payload(&payload, pts, dts, file_position, random_access)
            }
            _ => {}
        }
    }

    fn parse_h264_payload(
        &mut self,
        data: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
        file_position: u64,
        random_access: bool,
    ) {
        let mut units = Vec::new();
        let mut keyframe = false;

        for nal in AnnexBReader::new(data) {
            if nal.is_empty() {
                continue;
            }
            match h264::NalUnitType::from(nal[0]) {
                h264::NalUnitType::Sps => match h264::parse_sps(nal) {
                    Ok(sps) => {
                        let details = VideoDetails::from(&sps);
                        if !self.video_init_segment_dispatched {
                            self.video_params.sps = Some(Bytes::copy_from_slice(nal));
                            self.video_params.details = Some(details);
                            self.video_params.avc_sps = Some(sps);
                        } else if self.detect_video_metadata_change(&details) {
                            debug!("H264: Critical h264 metadata has been changed, attempt to re-generate InitSegment");
                            self.video_metadata_changed = true;
                            self.video_params = VideoParameterSets {
                                sps: Some(Bytes::copy_from_slice(nal)),
                                details: Some(details),
                                avc_sps: Some(sps),
                                ..Default::default()
                            };
                        }
                    }
                    Err(err) => error!("H264: failed to parse SPS: {}", err),
                },
                h264::NalUnitType::Pps => {
                    if !self.video_init_segment_dispatched || self.video_metadata_changed {
                        self.video_params.pps = Some(Bytes::copy_from_slice(nal));
                        if self.video_params.sps.is_some() {
                            if self.video_metadata_changed {
                                self.dispatch_video_media_segment();
                            }
                            self.dispatch_video_init_segment();
                        }
                    }
                }
                h264::NalUnitType::CodedSliceIdr => keyframe = true,
                h264::NalUnitType::CodedSliceNonIdr if random_access => keyframe = true,
                _ => {}
            }

            if self.video_init_segment_dispatched {
                units.push(NalUnit::new(nal[0] & 0x1f, length_prefixed(nal)));
            }
        }

        self.push_video_sample(units, keyframe, pts, dts, file_position);
    }

    fn parse_h265_payload(
        &mut self,
        data: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
        file_position: u64,
        _random_access: bool,
    ) {
        let mut units = Vec::new();
        let mut keyframe = false;

        for nal in AnnexBReader::new(data) {
            if nal.len() < 2 {
                continue;
            }
            let nal_type = h265::NalUnitType::from_header(nal[0]);
            match nal_type {
                h265::NalUnitType::Vps => {
                    if !self.video_init_segment_dispatched || self.video_metadata_changed {
                        match h265::parse_vps(nal) {
                            Ok(vps) => {
                                self.video_params.vps = Some(Bytes::copy_from_slice(nal));
                                self.video_params.hevc_vps = Some(vps);
                            }
                            Err(err) => error!("H265: failed to parse VPS: {}", err),
                        }
                    }
                }
                h265::NalUnitType::Sps => match h265::parse_sps(nal) {
                    Ok(sps) => {
                        let details = VideoDetails::from(&sps);
                        if !self.video_init_segment_dispatched {
                            self.video_params.sps = Some(Bytes::copy_from_slice(nal));
                            self.video_params.details = Some(details);
                            self.video_params.hevc_sps = Some(sps);
                        } else if self.detect_video_metadata_change(&details) {
                            debug!("H265: Critical h265 metadata has been changed, attempt to re-generate InitSegment");
                            self.video_metadata_changed = true;
                            self.video_params = VideoParameterSets {
                                sps: Some(Bytes::copy_from_slice(nal)),
                                details: Some(details),
                                hevc_sps: Some(sps),
                                ..Default::default()
                            };
                        }
                    }
                    Err(err) => error!("H265: failed to parse SPS: {}", err),
                },
                h265::NalUnitType::Pps => {
                    if !self.video_init_segment_dispatched || self.video_metadata_changed {
                        match h265::parse_pps(nal) {
                            Ok(pps) => {
                                self.video_params.pps = Some(Bytes::copy_from_slice(nal));
                                self.video_params.hevc_pps = Some(pps);
                            }
                            Err(err) => error!("H265: failed to parse PPS: {}", err),
                        }
                        let params = &self.video_params;
                        if params.vps.is_some() && params.sps.is_some() && params.pps.is_some() {
                            if self.video_metadata_changed {
                                self.dispatch_video_media_segment();
                            }
                            self.dispatch_video_init_segment();
                        }
                    }
                }
                _ if nal_type.is_random_access() => keyframe = true,
                _ => {}
            }

            if self.video_init_segment_dispatched {
                units.push(NalUnit::new((nal[0] >> 1) & 0x3f, length_prefixed(nal)));
            }
        }

        self.push_video_sample(units, keyframe, pts, dts, file_position);
    }

    fn push_video_sample(
        &mut self,
        units: Vec<NalUnit>,
        keyframe: bool,
        pts: Option<u64>,
        dts: Option<u64>,
        file_position: u64,
    ) {
        let (Some(pts), Some(dts)) = (pts, dts) else {
            return;
        };
        if units.is_empty() {
            return;
        }
        let sample = VideoSample::new(units, to_ms(dts), to_ms(pts))
            .with_keyframe(keyframe)
            .with_file_position(file_position);
        self.video_track.push(sample);
    }

    fn detect_video_metadata_change(&self, details: &VideoDetails) -> bool {
        let Some(current) = &self.video_params.details else {
            return true;
        };
        if details.codec_mimetype != current.codec_mimetype {
            debug!(
                "Video: Codec mimeType changed from {} to {}",
                current.codec_mimetype, details.codec_mimetype
            );
            return true;
        }
        if details.codec_size != current.codec_size {
            debug!(
                "Video: Coded Resolution changed from {}x{} to {}x{}",
                current.codec_size.width,
                current.codec_size.height,
                details.codec_size.width,
                details.codec_size.height
            );
            return true;
        }
        if details.present_size.width != current.present_size.width {
            debug!(
                "Video: Present resolution width changed from {} to {}",
                current.present_size.width, details.present_size.width
            );
            return true;
        }
        false
    }

    fn dispatch_video_init_segment(&mut self) {
        let params = &self.video_params;
        let Some(details) = params.details.clone() else {
            return;
        };

        let config = if let Some(av1c) = &params.av1c {
            VideoConfig::Av1(av1c.to_vec())
        } else if let Some(vps) = &params.vps {
            let (Some(sps), Some(pps), Some(vps_info), Some(sps_info), Some(pps_info)) = (
                &params.sps,
                &params.pps,
                &params.hevc_vps,
                &params.hevc_sps,
                &params.hevc_pps,
            ) else {
                return;
            };
            VideoConfig::Hevc(h265::build_hvcc(vps, sps, pps, vps_info, sps_info, pps_info))
        } else {
            let (Some(sps), Some(pps), Some(info)) = (&params.sps, &params.pps, &params.avc_sps)
            else {
                return;
            };
            VideoConfig::Avc(h264::build_avcc(sps, pps, info))
        };

        if !self.video_init_segment_dispatched {
            debug!(
                "Generated first decoder configuration record for mimeType: {}",
                details.codec_mimetype
            );
        }

        let frame_rate = details.frame_rate.clone();
        let ref_sample_duration = if frame_rate.fps_num == 0 || frame_rate.fps_den == 0 {
            DEFAULT_VIDEO_SAMPLE_DURATION
        } else {
            1000.0 * frame_rate.fps_den as f64 / frame_rate.fps_num as f64
        };

        let meta = VideoMetadata {
            id: VIDEO_TRACK_ID,
            timescale: 1000,
            duration: 0,
            codec_width: details.codec_size.width,
            codec_height: details.codec_size.height,
            present_width: details.present_size.width,
            present_height: details.present_size.height,
            profile: details.profile_string.clone(),
            level: details.level_string.clone(),
            bit_depth: details.bit_depth,
            chroma_format: details.chroma_format,
            sar_ratio: details.sar_ratio,
            frame_rate: frame_rate.clone(),
            ref_sample_duration,
            codec: details.codec_mimetype.clone(),
            config,
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_track_metadata(TrackMetadata::Video(meta));
        }
        self.video_init_segment_dispatched = true;
        self.video_metadata_changed = false;

        let info = &mut self.media_info;
        info.has_video = true;
        info.width = Some(details.codec_size.width);
        info.height = Some(details.codec_size.height);
        info.fps = Some(frame_rate.fps);
        info.profile = Some(details.profile_string);
        info.level = Some(details.level_string);
        info.ref_frames = Some(details.ref_frames);
        info.chroma_format = Some(details.chroma_format_string);
        info.sar_num = Some(details.sar_ratio.width);
        info.sar_den = Some(details.sar_ratio.height);
        info.video_codec = Some(details.codec_mimetype);
        info.update_mime_type();
        self.emit_media_info_if_complete();
    }

    /// Announces `config` if it is the first audio configuration, or flushes
    /// the pending audio and re-announces if it changed.
    fn update_audio_config(&mut self, config: AudioConfig) {
        if !self.audio_init_segment_dispatched {
            self.audio_config = Some(config);
            self.dispatch_audio_init_segment();
            return;
        }
        let changed = match &self.audio_config {
            Some(current) if current.codec() != config.codec() => {
                debug!(
                    "Audio: Audio Codecs changed from {} to {}",
                    current.codec(),
                    config.codec()
                );
                true
            }
            Some(current) => current.differs(&config),
            None => true,
        };
        if changed {
            debug!("Audio: {} configuration changed, re-generating InitSegment", config.codec());
            self.dispatch_audio_media_segment();
            self.audio_config = Some(config);
            self.dispatch_audio_init_segment();
        }
    }

    fn dispatch_audio_init_segment(&mut self) {
        let Some(config) = &self.audio_config else {
            return;
        };

        let mut meta = AudioMetadata {
            id: AUDIO_TRACK_ID,
            timescale: 1000,
            duration: 0,
            sample_rate: 0,
            channel_count: 0,
            channel_config_code: None,
            codec: config.codec().to_string(),
            original_codec: config.codec().to_string(),
            config: None,
            ref_sample_duration: config.frame_duration(),
            silent_audio_mode: false,
        };
        match config {
            AudioConfig::Aac(frame) => {
                let asc = AudioSpecificConfig::from_frame(frame);
                meta.sample_rate = asc.sampling_rate;
                meta.channel_count = asc.channel_count;
                meta.codec = asc.codec_mimetype;
                meta.original_codec = asc.original_codec_mimetype;
                meta.config = Some(asc.config);
            }
            AudioConfig::Ac3(frame) => {
                meta.sample_rate = frame.sampling_frequency;
                meta.channel_count = frame.channel_count;
                meta.config = Some(build_dac3(frame));
            }
            AudioConfig::Eac3(frame) => {
                meta.sample_rate = frame.sampling_frequency;
                meta.channel_count = frame.channel_count;
                meta.config = Some(build_dec3(frame));
            }
            AudioConfig::Opus(opus) => {
                meta.sample_rate = opus.sample_rate;
                meta.channel_count = opus.channel_count;
                meta.channel_config_code = Some(opus.channel_config_code);
            }
            AudioConfig::Mp3(header) => {
                meta.sample_rate = header.sample_rate;
                meta.channel_count = header.channel_count;
            }
        }

        if self.soft_decode_audio_codec.is_some() {
            meta = silent_aac_metadata(&meta);
        }

        if !self.audio_init_segment_dispatched {
            debug!("Generated first audio configuration for mimeType: {}", meta.codec);
        }
        let original_codec = meta.original_codec.clone();
        let sample_rate = meta.sample_rate;
        let channel_count = meta.channel_count;
        if let Some(listener) = self.listener.as_mut() {
            listener.on_track_metadata(TrackMetadata::Audio(meta));
        }
        self.audio_init_segment_dispatched = true;

        let info = &mut self.media_info;
        info.has_audio = true;
        info.audio_codec = Some(original_codec);
        info.audio_sample_rate = Some(sample_rate);
        info.audio_channel_count = Some(channel_count);
        info.update_mime_type();
        self.emit_media_info_if_complete();
    }

    fn emit_media_info_if_complete(&mut self) {
        if self.media_info.is_complete() {
            if let Some(listener) = self.listener.as_mut() {
                listener.on_media_info(&self.media_info);
            }
        }
    }

    fn is_init_segment_dispatched(&self) -> bool {
        match (self.has_video, self.has_audio) {
            (true, true) => self.video_init_segment_dispatched && self.audio_init_segment_dispatched,
            (true, false) => self.video_init_segment_dispatched,
            (false, true) => self.audio_init_segment_dispatched,
            (false, false) => false,
        }
    }

    fn dispatch_video_media_segment(&mut self) {
        if self.is_init_segment_dispatched() && !self.video_track.is_empty() {
            if let Some(listener) = self.listener.as_mut() {
                listener.on_data_available(None, Some(&mut self.video_track));
            }
        }
    }

    fn dispatch_audio_media_segment(&mut self) {
        if self.is_init_segment_dispatched() && !self.audio_track.is_empty() {
            if let Some(listener) = self.listener.as_mut() {
                listener.on_data_available(Some(&mut self.audio_track), None);
            }
        }
    }

    fn dispatch_audio_video_media_segment(&mut self) {
        if self.is_init_segment_dispatched()
            && (!self.audio_track.is_empty() || !self.video_track.is_empty())
        {
            if let Some(listener) = self.listener.as_mut() {
                listener.on_data_available(Some(&mut self.audio_track), Some(&mut self.video_track));
            }
        }
    }

    /// Millisecond pts of the first frame of an audio PES. Without a pts the
    /// frame follows the last one of the same codec.
    fn audio_base_pts(&self, pts: Option<u64>, codec: &'static str, label: &str) -> Option<f64> {
        if let Some(pts) = pts {
            return Some(pts as f64 / TICKS_PER_MS as f64);
        }
        let step = self
            .audio_config
            .as_ref()
            .filter(|config| config.codec() == codec)
            .and_then(AudioConfig::frame_duration);
        match (self.audio_last_sample_pts, step) {
            (Some(last), Some(step)) => Some(last + step),
            _ => {
                warn!("{}: Unknown pts", label);
                None
            }
        }
    }

    fn waiting_for_video(&self) -> bool {
        self.has_video && !self.video_init_segment_dispatched
    }

    fn parse_adts_aac_payload(&mut self, data: &[u8], pts: Option<u64>) {
        if self.waiting_for_video() {
            return;
        }
        let previous = self.aac_last_incomplete_data.take();
        let buffer;
        let data = match &previous {
            Some(previous) => {
                buffer = [previous.as_ref(), data].concat();
                &buffer[..]
            }
            None => data,
        };

        let Some(base_pts) = self.continued_base_pts(pts, "aac", "AAC", previous.is_some()) else {
            return;
        };

        let mut parser = AdtsParser::new(data);
        let mut pts = base_pts;
        let mut last_pts = None;
        while let Some(frame) = parser.next_frame() {
            let step = samples_duration(1024.0, frame.sampling_frequency).unwrap_or(0.0);
            let sample = AudioSample::new(frame.data.clone(), pts.floor() as i64);
            self.update_audio_config(AudioConfig::Aac(frame));
            self.audio_track.push(sample);
            last_pts = Some(pts);
            pts += step;
        }

        self.aac_last_incomplete_data = parser.incomplete_data().map(Bytes::copy_from_slice);
        if last_pts.is_some() {
            self.audio_last_sample_pts = last_pts;
        }
    }

    fn parse_loas_aac_payload(&mut self, data: &[u8], pts: Option<u64>) {
        if self.waiting_for_video() {
            return;
        }
        let previous = self.aac_last_incomplete_data.take();
        let buffer;
        let data = match &previous {
            Some(previous) => {
                buffer = [previous.as_ref(), data].concat();
                &buffer[..]
            }
            None => data,
        };

        let Some(base_pts) = self.continued_base_pts(pts, "aac", "AAC", previous.is_some()) else {
            return;
        };

        let mut parser = LoasParser::new(data);
        let mut pts = base_pts;
        let mut last_pts = None;
        while let Some(result) = parser.next_frame(self.loas_previous_frame.as_ref()) {
            let frame = match result {
                Ok(frame) => frame,
                Err(err) => {
                    self.report_error(&err);
                    continue;
                }
            };
            self.loas_previous_frame = Some(frame.clone());
            let step = samples_duration(1024.0, frame.sampling_frequency).unwrap_or(0.0);
            let sample = AudioSample::new(frame.data.clone(), pts.floor() as i64);
            self.update_audio_config(AudioConfig::Aac(frame));
            self.audio_track.push(sample);
            last_pts = Some(pts);
            pts += step;
        }

        self.aac_last_incomplete_data = parser.incomplete_data().map(Bytes::copy_from_slice);
        if last_pts.is_some() {
            self.audio_last_sample_pts = last_pts;
        }
    }

    /// Base pts of an audio payload. When the payload continues a frame cut
    /// at the end of the previous PES, a pts off by more than 1 ms from
    /// the expected one is replaced by the expected one.
    fn continued_base_pts(
        &self,
        pts: Option<u64>,
        codec: &'static str,
        label: &str,
        continues_frame: bool,
    ) -> Option<f64> {
        let mut base_pts = self.audio_base_pts(pts, codec, label)?;
        let step = self
            .audio_config
            .as_ref()
            .filter(|config| config.codec() == codec)
            .and_then(AudioConfig::frame_duration);
        if let (true, Some(last), Some(step)) = (continues_frame, self.audio_last_sample_pts, step) {
            let expected = last + step;
            if (expected - base_pts).abs() > 1.0 {
                warn!(
                    "{}: Detected pts overlapped, expected: {}ms, PES pts: {}ms",
                    label, expected, base_pts
                );
                base_pts = expected;
            }
        }
        Some(base_pts)
    }

    fn parse_ac3_payload(&mut self, data: &[u8], pts: Option<u64>) {
        if self.waiting_for_video() {
            return;
        }
        let previous = self.ac3_last_incomplete_data.take();
        let buffer;
        let data = match &previous {
            Some(previous) => {
                buffer = [previous.as_ref(), data].concat();
                &buffer[..]
            }
            None => data,
        };
        let Some(mut pts) = self.continued_base_pts(pts, "ac-3", "AC3", previous.is_some()) else {
            return;
        };

        let mut parser = Ac3Parser::new(data);
        let mut last_pts = None;
        while let Some(frame) = parser.next_frame() {
            let step = samples_duration(1536.0, frame.sampling_frequency).unwrap_or(0.0);
            let sample = AudioSample::new(frame.data.clone(), pts.floor() as i64);
            self.update_audio_config(AudioConfig::Ac3(frame));
            self.audio_track.push(sample);
            last_pts = Some(pts);
            pts += step;
        }

        self.ac3_last_incomplete_data = parser.incomplete_data().map(Bytes::copy_from_slice);
        if last_pts.is_some() {
            self.audio_last_sample_pts = last_pts;
        }
    }

    fn parse_eac3_payload(&mut self, data: &[u8], pts: Option<u64>) {
        if self.waiting_for_video() {
            return;
        }
        let previous = self.eac3_last_incomplete_data.take();
        let buffer;
        let data = match &previous {
            Some(previous) => {
                buffer = [previous.as_ref(), data].concat();
                &buffer[..]
            }
            None => data,
        };
        let Some(mut pts) = self.continued_base_pts(pts, "ec-3", "EAC3", previous.is_some()) else {
            return;
        };

        let mut parser = Eac3Parser::new(data);
        let mut last_pts = None;
        while let Some(frame) = parser.next_frame() {
            let step = samples_duration(256.0 * frame.num_blks as f64, frame.sampling_frequency)
                .unwrap_or(0.0);
            let sample = AudioSample::new(frame.data.clone(), pts.floor() as i64);
            self.update_audio_config(AudioConfig::Eac3(frame));
            self.audio_track.push(sample);
            last_pts = Some(pts);
            pts += step;
        }

        self.eac3_last_incomplete_data = parser.incomplete_data().map(Bytes::copy_from_slice);
        if last_pts.is_some() {
            self.audio_last_sample_pts = last_pts;
        }
    }

    fn parse_opus_payload(&mut self, data: &[u8], pts: Option<u64>) {
        if self.waiting_for_video() {
            return;
        }
        let Some(mut pts) = self.audio_base_pts(pts, "opus", "Opus") else {
            return;
        };

        let mut last_pts = None;
        for unit in opus::split_access_units(data) {
            self.audio_track.push(AudioSample::new(unit, pts.floor() as i64));
            last_pts = Some(pts);
            pts += opus::FRAME_DURATION_MS;
        }
        if last_pts.is_some() {
            self.audio_last_sample_pts = last_pts;
        }
    }

    fn parse_mp3_payload(&mut self, data: Bytes, pts: Option<u64>) {
        if self.waiting_for_video() {
            return;
        }
        let header = match mpeg_audio::parse_header(&data) {
            Ok(header) => header,
            Err(err) => {
                error!("MP3: {}", err);
                return;
            }
        };
        let pts_ms = match pts {
            Some(pts) => to_ms(pts),
            None => {
                let step = match &self.audio_config {
                    Some(AudioConfig::Mp3(previous)) => samples_duration(
                        previous.samples_per_frame() as f64,
                        previous.sample_rate,
                    ),
                    _ => None,
                };
                match (self.audio_last_sample_pts, step) {
                    (Some(last), Some(step)) => (last + step).floor() as i64,
                    _ => {
                        warn!("MP3: Unknown pts");
                        return;
                    }
                }
            }
        };
        self.audio_last_sample_pts = Some(pts_ms as f64);

        if header.is_layer2() && self.config.soft_decode_mp2 {
            if self.soft_decode_audio_codec.is_none() {
                self.soft_decode_audio_codec = Some("mp2");
                info!("MP2 audio detected, enabling software decode");
            }
            self.update_audio_config(AudioConfig::Mp3(header));
            if let Some(listener) = self.listener.as_mut() {
                listener.on_raw_audio_data(RawAudioFrame {
                    codec: "mp2",
                    data,
                    pts: pts_ms,
                });
            }
            return;
        }

        self.update_audio_config(AudioConfig::Mp3(header));
        self.audio_track.push(AudioSample::new(data, pts_ms));
    }

    fn dispatch_pes_private_data(
        &mut self,
        pid: u16,
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        payload: Bytes,
    ) {
        let nearest_pts = if pts.is_none() {
            self.nearest_timestamp_ms()
        } else {
            None
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_pes_private_data(PesPrivateData {
                pid,
                stream_id,
                pts: pts.map(to_ms),
                dts: dts.map(to_ms),
                nearest_pts,
                len: payload.len(),
                data: payload,
            });
        }
    }

    fn dispatch_timed_id3(
        &mut self,
        pid: u16,
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        payload: Bytes,
    ) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_timed_id3_metadata(PesPrivateData {
                pid,
                stream_id,
                pts: pts.map(to_ms),
                dts: dts.map(to_ms),
                nearest_pts: None,
                len: payload.len(),
                data: payload,
            });
        }
    }

    fn dispatch_synchronous_klv(
        &mut self,
        pid: u16,
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        payload: Bytes,
    ) {
        let access_units = klv::parse_access_units(&payload);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_synchronous_klv_metadata(KlvData {
                pid,
                stream_id,
                pts: pts.map(to_ms),
                dts: dts.map(to_ms),
                access_units,
                len: payload.len(),
                data: payload,
            });
        }
    }

    fn parse_smpte2038_payload(
        &mut self,
        pid: u16,
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        payload: Bytes,
    ) {
        let data = Smpte2038Data {
            pid,
            stream_id,
            pts: pts.map(to_ms),
            dts: dts.map(to_ms),
            nearest_pts: self.nearest_timestamp_ms(),
            ancillaries: smpte2038::parse_ancillary_data(&payload),
            len: payload.len(),
            data: payload,
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_smpte2038_metadata(data);
        }
    }
}

/// Registers timed ID3 and synchronous KLV pids from metadata descriptors.
fn parse_metadata_descriptors(pmt: &mut Pmt, stream: &PmtStream) {
    for (tag, body) in parser::descriptors(&stream.es_info) {
        if tag != DESCRIPTOR_METADATA || body.len() < 3 {
            continue;
        }
        let application_format = u16::from_be_bytes([body[0], body[1]]);
        let mut pos = 2;
        let mut application_format_identifier = None;
        if application_format == 0xffff {
            application_format_identifier = body.get(2..).and_then(parser::fourcc);
            pos += 4;
        }
        let metadata_format_identifier = match body.get(pos) {
            Some(0xff) => body.get(pos + 1..).and_then(parser::fourcc),
            _ => None,
        };

        match (application_format_identifier, metadata_format_identifier) {
            (Some("ID3 "), Some("ID3 ")) => {
                pmt.timed_id3_pids.insert(stream.pid);
            }
            (_, Some("KLVA")) => {
                pmt.synchronous_klv_pids.insert(stream.pid);
            }
            _ => {}
        }
    }
}

/// AAC-LC metadata announcing a silent track while the real audio is
/// decoded elsewhere.
fn silent_aac_metadata(meta: &AudioMetadata) -> AudioMetadata {
    let sample_rate = if meta.sample_rate == 0 { 48000 } else { meta.sample_rate };
    let channel_count = if meta.channel_count == 0 { 2 } else { meta.channel_count };
    let index = SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .unwrap_or(3) as u8;

    AudioMetadata {
        sample_rate,
        channel_count,
        channel_config_code: None,
        codec: "mp4a.40.2".into(),
        original_codec: "mp4a.40.2".into(),
        config: Some(vec![
            0x10 | (index >> 1),
            ((index & 0x01) << 7) | (channel_count << 3),
        ]),
        ref_sample_duration: samples_duration(1024.0, sample_rate),
        silent_audio_mode: true,
        ..meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    struct NullListener;

    impl DemuxListener for NullListener {
        fn on_error(&mut self, _kind: ErrorKind, _detail: &str) {}
        fn on_media_info(&mut self, _info: &MediaInfo) {}
        fn on_track_metadata(&mut self, _metadata: TrackMetadata) {}
        fn on_data_available(&mut self, _audio: Option<&mut AudioTrack>, _video: Option<&mut VideoTrack>) {}
    }

    fn demuxer() -> TSDemuxer {
        let mut demuxer = TSDemuxer::new(
            ProbeData {
                ts_packet_size: TS_PACKET_SIZE,
                sync_offset: 0,
            },
            DemuxConfig::default(),
        );
        demuxer.set_listener(Box::new(NullListener));
        demuxer
    }

    /// Adaptation-field-only packet carrying a PCR with the given base.
    fn pcr_packet(base: u64) -> Vec<u8> {
        let mut packet = vec![0xff; TS_PACKET_SIZE];
        packet[..4].copy_from_slice(&[0x47, 0x01, 0x00, 0x30]);
        packet[4] = 183;
        packet[5] = 0x10;
        packet[6] = (base >> 25) as u8;
        packet[7] = (base >> 17) as u8;
        packet[8] = (base >> 9) as u8;
        packet[9] = (base >> 1) as u8;
        packet[10] = ((base & 0x01) as u8) << 7 | 0x7e;
        packet[11] = 0x00;
        packet
    }

    #[test]
    fn test_pcr_wraparound_keeps_increasing() {
        let mut demuxer = demuxer();
        let before_wrap = PTS_WRAP - 90_000;
        demuxer.parse_chunks(&pcr_packet(before_wrap), 0).unwrap();
        let first = demuxer.last_pcr().unwrap();
        assert_eq!(first, before_wrap * 300);

        demuxer.parse_chunks(&pcr_packet(90_000), 188).unwrap();
        let second = demuxer.last_pcr().unwrap();
        assert!(second > first);
        assert_eq!(second, (PTS_WRAP + 90_000) * 300);

        // later timestamps are lifted into the same epoch
        assert_eq!(demuxer.timestamp(180_000), PTS_WRAP + 180_000);
    }

    #[test]
    fn test_timestamp_base() {
        let mut demuxer = demuxer();
        demuxer.set_timestamp_base(10.0);
        assert_eq!(demuxer.timestamp(0), 900_000);
        assert_eq!(to_ms(demuxer.timestamp(9_000)), 10_100);
    }

    #[test]
    fn test_silent_aac_metadata() {
        let meta = AudioMetadata {
            id: AUDIO_TRACK_ID,
            timescale: 1000,
            duration: 0,
            sample_rate: 44100,
            channel_count: 2,
            channel_config_code: None,
            codec: "mp3".into(),
            original_codec: "mp3".into(),
            config: None,
            ref_sample_duration: None,
            silent_audio_mode: false,
        };
        let silent = silent_aac_metadata(&meta);
        assert_eq!(silent.codec, "mp4a.40.2");
        assert_eq!(silent.config, Some(vec![0x12, 0x10]));
        assert!(silent.silent_audio_mode);
        assert_eq!(silent.id, AUDIO_TRACK_ID);
    }

    #[test]
    fn test_parse_without_listener_fails() {
        let mut demuxer = TSDemuxer::new(
            ProbeData {
                ts_packet_size: TS_PACKET_SIZE,
                sync_offset: 0,
            },
            DemuxConfig::default(),
        );
        assert!(matches!(
            demuxer.parse_chunks(&pcr_packet(0), 0),
            Err(RemuxError::Precondition(_))
        ));
    }
}
