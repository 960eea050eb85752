use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tsremux::av::TrackType;
use tsremux::config::Config;
use tsremux::error::ErrorKind;
use tsremux::format::mp4::{InitSegment, MediaSegment};
use tsremux::transmuxer::{SideData, TransmuxListener, Transmuxer};
use tsremux::utils::Crc32Mpeg2;

const PMT_PID: u16 = 0x1000;
const VIDEO_PID: u16 = 0x100;
const AUDIO_PID: u16 = 0x101;

const SPS: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];
const IDR_SLICE: [u8; 5] = [0x65, 0x88, 0x84, 0x21, 0x33];
const NON_IDR_SLICE: [u8; 4] = [0x41, 0x9A, 0x02, 0x04];

#[derive(Clone, Default)]
struct Output {
    init_segments: Arc<Mutex<Vec<InitSegment>>>,
    media_segments: Arc<Mutex<Vec<MediaSegment>>>,
    errors: Arc<Mutex<Vec<ErrorKind>>>,
    side_data: Arc<Mutex<Vec<SideData>>>,
}

impl Output {
    fn samples(&self, track_type: TrackType) -> usize {
        self.media_segments
            .lock()
            .iter()
            .filter(|segment| segment.track_type == track_type)
            .map(|segment| segment.sample_count)
            .sum()
    }
}

impl TransmuxListener for Output {
    fn on_init_segment(&mut self, segment: InitSegment) {
        self.init_segments.lock().push(segment);
    }

    fn on_media_segment(&mut self, segment: MediaSegment) {
        self.media_segments.lock().push(segment);
    }

    fn on_error(&mut self, kind: ErrorKind, _detail: &str) {
        self.errors.lock().push(kind);
    }

    fn on_side_data(&mut self, data: SideData) {
        self.side_data.lock().push(data);
    }
}

#[derive(Default)]
struct TsWriter {
    data: Vec<u8>,
    counter: u8,
}

impl TsWriter {
    fn packet(&mut self, pid: u16, payload_unit_start: bool, payload: &[u8]) {
        let mut packet = vec![
            0x47,
            (payload_unit_start as u8) << 6 | (pid >> 8) as u8,
            pid as u8,
            self.counter & 0x0f,
        ];
        self.counter = self.counter.wrapping_add(1);
        if payload.len() == 184 {
            packet[3] |= 0x10;
        } else {
            packet[3] |= 0x30;
            let stuffing = 183 - payload.len();
            packet.push(stuffing as u8);
            if stuffing > 0 {
                packet.push(0x00);
                packet.resize(5 + stuffing, 0xff);
            }
        }
        packet.extend_from_slice(payload);
        self.data.extend_from_slice(&packet);
    }

    fn section(&mut self, pid: u16, mut section: Vec<u8>) {
        let crc = Crc32Mpeg2::calculate(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        let mut payload = vec![0x00];
        payload.extend_from_slice(&section);
        payload.resize(184, 0xff);
        self.packet(pid, true, &payload);
    }

    fn program(&mut self, with_audio: bool) {
        self.section(
            0x0000,
            vec![0x00, 0xb0, 0x0d, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x01, 0xf0, 0x00],
        );
        let mut pmt = vec![
            0x02, 0xb0, 0x00, 0x00, 0x01, 0xc1, 0x00, 0x00, 0xe1, 0x00, 0xf0, 0x00, 0x1b, 0xe1,
            0x00, 0xf0, 0x00,
        ];
        if with_audio {
            pmt.extend_from_slice(&[0x0f, 0xe1, 0x01, 0xf0, 0x00]);
        }
        pmt[2] = (pmt.len() - 3 + 4) as u8;
        self.section(PMT_PID, pmt);
    }

    fn pes(&mut self, pid: u16, stream_id: u8, pts: u64, payload: &[u8]) {
        let mut pes = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80, 0x80, 0x05];
        pes.extend_from_slice(&[
            0x21 | (((pts >> 30) & 0x07) as u8) << 1,
            (pts >> 22) as u8,
            (((pts >> 15) & 0x7f) as u8) << 1 | 1,
            (pts >> 7) as u8,
            ((pts & 0x7f) as u8) << 1 | 1,
        ]);
        pes.extend_from_slice(payload);
        let length = (pes.len() - 6) as u16;
        pes[4..6].copy_from_slice(&length.to_be_bytes());

        for (i, chunk) in pes.chunks(184).enumerate() {
            self.packet(pid, i == 0, chunk);
        }
    }
}

fn annexb(nals: &[&[u8]]) -> Vec<u8> {
    nals.iter()
        .flat_map(|nal| [0x00, 0x00, 0x00, 0x01].iter().chain(nal.iter()).copied())
        .collect()
}

/// Two AAC-LC frames, 44.1 kHz stereo.
fn adts_frames() -> Vec<u8> {
    let mut data = Vec::new();
    for _ in 0..2 {
        let payload = [0x21u8; 12];
        let frame_length = payload.len() + 7;
        data.extend_from_slice(&[
            0xFF,
            0xF1,
            (1 << 6) | (4 << 2),
            (2 << 6) | ((frame_length >> 11) & 0x03) as u8,
            ((frame_length >> 3) & 0xFF) as u8,
            (((frame_length & 0x07) << 5) as u8) | 0x1F,
            0xFC,
        ]);
        data.extend_from_slice(&payload);
    }
    data
}

/// One keyframe followed by non-key frames, 40 ms apart, optionally with
/// an audio PES next to every video frame.
fn stream(frames: usize, with_audio: bool) -> Vec<u8> {
    let mut ts = TsWriter::default();
    ts.program(with_audio);
    for i in 0..frames {
        let pts = 90_000 + i as u64 * 3_600;
        let payload = if i == 0 {
            annexb(&[&SPS, &PPS, &IDR_SLICE])
        } else {
            annexb(&[&NON_IDR_SLICE])
        };
        ts.pes(VIDEO_PID, 0xe0, pts, &payload);
        if with_audio {
            ts.pes(AUDIO_PID, 0xc0, 90_000 + i as u64 * 4_180, &adts_frames());
        }
    }
    ts.data
}

#[tokio::test]
async fn test_feed_reader_video_only() {
    let output = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));
    let data = stream(6, false);

    let read = transmuxer.feed_reader(&mut data.as_slice()).await.unwrap();
    assert_eq!(read, data.len() as u64);
    assert_eq!(transmuxer.bytes_consumed(), data.len() as u64);

    let inits = output.init_segments.lock().clone();
    assert_eq!(inits.len(), 1);
    assert_eq!(inits[0].track_type, TrackType::Video);
    assert_eq!(inits[0].container, "video/mp4");
    assert_eq!(inits[0].codec, "avc1.42c01e");
    assert_eq!(&inits[0].data[4..8], b"ftyp");

    let segments = output.media_segments.lock().clone();
    assert!(!segments.is_empty());
    assert!(segments.iter().all(|segment| &segment.data[4..8] == b"moof"));
    assert_eq!(output.samples(TrackType::Video), 6);
    assert!(segments
        .windows(2)
        .all(|pair| pair[0].info.begin_dts < pair[1].info.begin_dts));
    assert!(output.errors.lock().is_empty());

    let info = transmuxer.media_info().unwrap();
    assert_eq!(info.width, Some(320));
    assert!(info.is_complete());
}

#[tokio::test]
async fn test_feed_reader_audio_and_video() {
    let output = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));
    let data = stream(8, true);

    transmuxer.feed_reader(&mut data.as_slice()).await.unwrap();

    let inits = output.init_segments.lock().clone();
    let kinds: Vec<_> = inits.iter().map(|init| init.track_type).collect();
    assert_eq!(kinds, vec![TrackType::Video, TrackType::Audio]);
    assert_eq!(inits[1].container, "audio/mp4");
    assert_eq!(inits[1].codec, "mp4a.40.5");

    assert_eq!(output.samples(TrackType::Video), 8);
    assert!(output.samples(TrackType::Audio) > 0);
    assert_eq!(
        transmuxer.media_info().and_then(|info| info.mime_type.clone()),
        Some("video/mp2t; codecs=\"avc1.42c01e,mp4a.40.2\"".to_string())
    );
}

#[test]
fn test_chunked_feed_matches_single_feed() {
    let data = stream(6, false);

    let whole = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(whole.clone()));
    transmuxer.feed(&data).unwrap();
    transmuxer.end().unwrap();

    let chunked = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(chunked.clone()));
    for chunk in data.chunks(100) {
        transmuxer.feed(chunk).unwrap();
    }
    transmuxer.end().unwrap();

    assert_eq!(chunked.init_segments.lock().len(), 1);
    assert_eq!(
        chunked.samples(TrackType::Video),
        whole.samples(TrackType::Video)
    );
    assert_eq!(transmuxer.bytes_consumed(), data.len() as u64);
}

#[test]
fn test_identical_input_gives_identical_segments() {
    let data = stream(5, true);
    let run = || {
        let output = Output::default();
        let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));
        transmuxer.feed(&data).unwrap();
        transmuxer.end().unwrap();
        let init_segments = output.init_segments.lock().clone();
        let media_segments = output.media_segments.lock().clone();
        (init_segments, media_segments)
    };

    let (first_init, first_media) = run();
    let (second_init, second_media) = run();
    assert_eq!(first_init, second_init);
    assert_eq!(first_media, second_media);
    assert_eq!(first_init.len(), 2);
    assert!(!first_media.is_empty());
}

#[test]
fn test_resync_after_garbage() {
    let output = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));
    let data = stream(6, false);
    let (head, tail) = data.split_at(3 * 188);

    transmuxer.feed(head).unwrap();
    transmuxer.feed(&[0x00; 50]).unwrap();
    transmuxer.feed(tail).unwrap();
    transmuxer.end().unwrap();

    assert_eq!(output.init_segments.lock().len(), 1);
    assert!(output.samples(TrackType::Video) >= 4);
}

#[test]
fn test_non_ts_input_is_rejected() {
    let output = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));

    let err = transmuxer.feed(&[0x00; 1024]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatUnsupported);
    assert_eq!(*output.errors.lock(), vec![ErrorKind::FormatUnsupported]);
    assert!(output.init_segments.lock().is_empty());
}

#[test]
fn test_feed_reader_with_split_reads() {
    let data = stream(4, false);
    let (head, tail) = data.split_at(250);
    let mut reader = tokio_test::io::Builder::new().read(head).read(tail).build();

    let output = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));
    let read = tokio_test::block_on(transmuxer.feed_reader(&mut reader));

    assert_eq!(tokio_test::assert_ok!(read), data.len() as u64);
    assert_eq!(output.samples(TrackType::Video), 4);
}

#[test]
fn test_seek_to_unaligned_position() {
    let output = Output::default();
    let mut transmuxer = Transmuxer::new(Config::default(), Box::new(output.clone()));
    let data = stream(12, false);

    transmuxer.feed(&data[..1000]).unwrap();
    assert_eq!(transmuxer.bytes_consumed(), 5 * 188);

    // lands 28 bytes before the next packet
    transmuxer.seek(1100);
    transmuxer.feed(&data[1100..]).unwrap();
    transmuxer.end().unwrap();

    assert_eq!(transmuxer.bytes_consumed(), data.len() as u64);
    assert!(output.errors.lock().is_empty());
    assert_eq!(output.init_segments.lock().len(), 1);
    assert!(output.samples(TrackType::Video) >= 8);
}
