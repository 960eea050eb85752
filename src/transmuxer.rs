//! # TS to fMP4 transmuxing
//!
//! [`Transmuxer`] wires a [`TSDemuxer`] to an [`MP4Remuxer`]: bytes go in
//! through [`Transmuxer::feed`] or [`Transmuxer::feed_reader`], init and
//! media segments come out through a [`TransmuxListener`].
//!
//! ```rust
//! use tsremux::config::Config;
//! use tsremux::format::mp4::{InitSegment, MediaSegment};
//! use tsremux::transmuxer::{TransmuxListener, Transmuxer};
//!
//! struct Sink;
//!
//! impl TransmuxListener for Sink {
//!     fn on_init_segment(&mut self, segment: InitSegment) {
//!         println!("init segment for {}", segment.codec);
//!     }
//!     fn on_media_segment(&mut self, segment: MediaSegment) {
//!         println!("{} samples", segment.sample_count);
//!     }
//! }
//!
//! # fn main() -> tsremux::Result<()> {
//! let mut transmuxer = Transmuxer::new(Config::default(), Box::new(Sink));
//! transmuxer.feed(&[0x47; 100])?; // too short to probe, buffered
//! transmuxer.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::av::{
    AudioTrack, DemuxListener, KlvData, MediaInfo, PesPrivateData, PesPrivateDataDescriptor,
    PgsSubtitleData, RawAudioFrame, Scte35Metadata, Smpte2038Data, TrackMetadata, VideoTrack,
};
use crate::config::Config;
use crate::error::{ErrorKind, RemuxError, Result};
use crate::format::mp4::{InitSegment, MP4Remuxer, MediaSegment, RemuxListener};
use crate::format::ts::{ProbeResult, TSDemuxer, FEC_PACKET_SIZE};

/// Read size used by [`Transmuxer::feed_reader`].
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Side-channel data forwarded from the demuxer unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum SideData {
    TimedId3(PesPrivateData),
    PgsSubtitle(PgsSubtitleData),
    SynchronousKlv(KlvData),
    AsynchronousKlv(PesPrivateData),
    Smpte2038(Smpte2038Data),
    Scte35(Scte35Metadata),
    PesPrivateData(PesPrivateData),
    PesPrivateDataDescriptor(PesPrivateDataDescriptor),
    RawAudio(RawAudioFrame),
}

/// Consumer of everything a [`Transmuxer`] produces.
pub trait TransmuxListener: Send {
    fn on_init_segment(&mut self, segment: InitSegment);
    fn on_media_segment(&mut self, segment: MediaSegment);

    fn on_media_info(&mut self, _info: &MediaInfo) {}
    fn on_error(&mut self, _kind: ErrorKind, _detail: &str) {}
    fn on_side_data(&mut self, _data: SideData) {}
}

type SharedListener = Arc<Mutex<Box<dyn TransmuxListener>>>;

/// Hands remuxer output to the shared listener.
struct SegmentForwarder {
    listener: SharedListener,
}

impl RemuxListener for SegmentForwarder {
    fn on_init_segment(&mut self, segment: InitSegment) {
        self.listener.lock().on_init_segment(segment);
    }

    fn on_media_segment(&mut self, segment: MediaSegment) {
        self.listener.lock().on_media_segment(segment);
    }
}

/// Feeds demuxer output into the remuxer, side data into the listener.
struct DemuxBridge {
    remuxer: Arc<Mutex<MP4Remuxer>>,
    listener: SharedListener,
}

impl DemuxBridge {
    fn report(&self, err: RemuxError) {
        error!("{}", err);
        self.listener.lock().on_error(err.kind(), &err.to_string());
    }

    fn side_data(&self, data: SideData) {
        self.listener.lock().on_side_data(data);
    }
}

impl DemuxListener for DemuxBridge {
    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.listener.lock().on_error(kind, detail);
    }

    fn on_media_info(&mut self, info: &MediaInfo) {
        self.listener.lock().on_media_info(info);
    }

    fn on_track_metadata(&mut self, metadata: TrackMetadata) {
        let result = self.remuxer.lock().on_track_metadata(metadata);
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn on_data_available(&mut self, audio: Option<&mut AudioTrack>, video: Option<&mut VideoTrack>) {
        let result = self.remuxer.lock().remux(audio, video);
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn on_timed_id3_metadata(&mut self, data: PesPrivateData) {
        self.side_data(SideData::TimedId3(data));
    }

    fn on_pgs_subtitle_data(&mut self, data: PgsSubtitleData) {
        self.side_data(SideData::PgsSubtitle(data));
    }

    fn on_synchronous_klv_metadata(&mut self, data: KlvData) {
        self.side_data(SideData::SynchronousKlv(data));
    }

    fn on_asynchronous_klv_metadata(&mut self, data: PesPrivateData) {
        self.side_data(SideData::AsynchronousKlv(data));
    }

    fn on_smpte2038_metadata(&mut self, data: Smpte2038Data) {
        self.side_data(SideData::Smpte2038(data));
    }

    fn on_scte35_metadata(&mut self, data: Scte35Metadata) {
        self.side_data(SideData::Scte35(data));
    }

    fn on_pes_private_data(&mut self, data: PesPrivateData) {
        self.side_data(SideData::PesPrivateData(data));
    }

    fn on_pes_private_data_descriptor(&mut self, data: PesPrivateDataDescriptor) {
        self.side_data(SideData::PesPrivateDataDescriptor(data));
    }

    fn on_raw_audio_data(&mut self, frame: RawAudioFrame) {
        self.side_data(SideData::RawAudio(frame));
    }
}

/// MPEG-TS in, fragmented MP4 out.
///
/// Input may be split anywhere: bytes that do not complete a packet are
/// kept until the next [`feed`](Transmuxer::feed). The packet layout is
/// probed from the first bytes and probed again when sync is lost.
pub struct Transmuxer {
    config: Config,
    listener: SharedListener,
    remuxer: Arc<Mutex<MP4Remuxer>>,
    demuxer: Option<TSDemuxer>,
    /// Bytes not consumed by the demuxer yet.
    pending: Vec<u8>,
    /// Stream offset of `pending[0]`.
    pending_position: u64,
    /// Packet alignment must be probed again before the next parse.
    needs_resync: bool,
}

impl Transmuxer {
    pub fn new(config: Config, listener: Box<dyn TransmuxListener>) -> Self {
        let listener: SharedListener = Arc::new(Mutex::new(listener));
        let mut remuxer = MP4Remuxer::new(config.remux.clone());
        remuxer.set_listener(Box::new(SegmentForwarder {
            listener: Arc::clone(&listener),
        }));

        Self {
            config,
            listener,
            remuxer: Arc::new(Mutex::new(remuxer)),
            demuxer: None,
            pending: Vec::new(),
            pending_position: 0,
            needs_resync: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Media info gathered so far, once the stream has been probed.
    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.demuxer.as_ref().map(TSDemuxer::media_info)
    }

    /// Total number of bytes handed to the demuxer.
    pub fn bytes_consumed(&self) -> u64 {
        self.pending_position
    }

    /// Demuxes and remuxes as much of `data` as forms whole packets.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);

        if self.demuxer.is_none() {
            match TSDemuxer::probe(&self.pending) {
                ProbeResult::NeedMoreData => return Ok(()),
                ProbeResult::NoMatch => {
                    self.pending.clear();
                    let err =
                        RemuxError::UnsupportedFormat("Could not find MPEG-TS sync pattern".into());
                    error!("{}", err);
                    self.listener.lock().on_error(err.kind(), &err.to_string());
                    return Err(err);
                }
                ProbeResult::Match(probe) => {
                    debug!(
                        "Probed MPEG-TS: packet size {}, sync offset {}",
                        probe.ts_packet_size, probe.sync_offset
                    );
                    let mut demuxer = TSDemuxer::new(probe, self.config.demux.clone());
                    demuxer.set_listener(Box::new(DemuxBridge {
                        remuxer: Arc::clone(&self.remuxer),
                        listener: Arc::clone(&self.listener),
                    }));
                    self.demuxer = Some(demuxer);
                }
            }
        }

        let Some(demuxer) = self.demuxer.as_mut() else {
            return Ok(());
        };

        if self.needs_resync {
            match TSDemuxer::probe(&self.pending) {
                ProbeResult::NeedMoreData => return Ok(()),
                ProbeResult::NoMatch => {
                    warn!(
                        "No sync after seek to byte {}, dropping {} bytes",
                        self.pending_position,
                        self.pending.len()
                    );
                    self.pending_position += self.pending.len() as u64;
                    self.pending.clear();
                    return Ok(());
                }
                ProbeResult::Match(probe) => {
                    debug!(
                        "Resuming at byte {} after seek",
                        self.pending_position + probe.sync_offset as u64
                    );
                    demuxer.resync(probe);
                    self.needs_resync = false;
                }
            }
        }

        let mut consumed = demuxer.parse_chunks(&self.pending, self.pending_position)?;
        if consumed == 0 && self.pending.len() > 3 * FEC_PACKET_SIZE {
            match TSDemuxer::probe(&self.pending) {
                ProbeResult::Match(probe) => {
                    warn!(
                        "Lost sync at byte {}, resuming {} bytes later",
                        self.pending_position, probe.sync_offset
                    );
                    demuxer.resync(probe);
                    consumed = demuxer.parse_chunks(&self.pending, self.pending_position)?;
                }
                ProbeResult::NoMatch => {
                    warn!(
                        "Lost sync at byte {}, dropping {} bytes",
                        self.pending_position,
                        self.pending.len()
                    );
                    consumed = self.pending.len();
                }
                ProbeResult::NeedMoreData => {}
            }
        }

        self.pending.drain(..consumed);
        self.pending_position += consumed as u64;
        Ok(())
    }

    /// Reads `reader` to the end, feeding everything read, and flushes.
    /// Returns the number of bytes read.
    pub async fn feed_reader<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<u64> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            self.feed(&buf[..n])?;
        }
        self.end()?;
        Ok(total)
    }

    /// Emits the samples the remuxer still holds back.
    pub fn end(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            debug!("Discarding {} trailing bytes", self.pending.len());
        }
        self.remuxer.lock().flush_stashed_samples()
    }

    /// Drops state tied to the current position. Data fed next starts at
    /// `byte_position` of the stream, is probed for packet alignment again
    /// and is treated as discontinuous.
    pub fn seek(&mut self, byte_position: u64) {
        {
            let mut remuxer = self.remuxer.lock();
            remuxer.seek();
            remuxer.insert_discontinuity();
        }
        self.pending.clear();
        self.pending_position = byte_position;
        self.needs_resync = self.demuxer.is_some();
    }

    pub fn destroy(&mut self) {
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.destroy();
        }
        self.demuxer = None;
        self.remuxer.lock().destroy();
        self.pending.clear();
    }
}
