//! ISO-BMFF box synthesis for fragmented MP4.
//!
//! Every box is `size (u32 BE) | type (4 ASCII bytes) | content`. The init
//! segment carries an empty sample table; samples only ever live in
//! `moof`/`mdat` fragments.

use bytes::{BufMut, BytesMut};

use crate::av::{AudioMetadata, TrackMetadata, VideoConfig, VideoMetadata};

const COMPRESSOR_NAME: &[u8] = b"tsremux";

/// Per-sample dependency flags shared by `trun` and `sdtp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleFlags {
    pub is_leading: u8,
    pub depends_on: u8,
    pub is_depended_on: u8,
    pub has_redundancy: u8,
    pub is_non_sync: u8,
}

impl SampleFlags {
    /// Flags of an audio frame, which never references other frames.
    pub fn audio() -> Self {
        Self {
            depends_on: 1,
            ..Default::default()
        }
    }

    pub fn video(is_keyframe: bool) -> Self {
        if is_keyframe {
            Self {
                depends_on: 2,
                is_depended_on: 1,
                ..Default::default()
            }
        } else {
            Self {
                depends_on: 1,
                is_non_sync: 1,
                ..Default::default()
            }
        }
    }
}

/// The per-sample fields of a `trun` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSample {
    pub duration: u32,
    pub size: u32,
    pub cts: i32,
    pub flags: SampleFlags,
}

fn mp4_box(box_type: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    let size = 8 + children.iter().map(|c| c.len()).sum::<usize>();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u32(size as u32);
    buf.put_slice(box_type);
    for child in children {
        buf.put_slice(child);
    }
    buf.to_vec()
}

fn full_box_header(version: u8, flags: u32) -> [u8; 4] {
    ((version as u32) << 24 | (flags & 0x00FF_FFFF)).to_be_bytes()
}

/// `ftyp` followed by `moov` for a single track.
pub fn init_segment(meta: &TrackMetadata) -> Vec<u8> {
    let ftyp = mp4_box(b"ftyp", &[b"isom", &1u32.to_be_bytes(), b"isom", b"avc1"]);
    let moov = moov(meta);
    let mut segment = Vec::with_capacity(ftyp.len() + moov.len());
    segment.extend_from_slice(&ftyp);
    segment.extend_from_slice(&moov);
    segment
}

fn moov(meta: &TrackMetadata) -> Vec<u8> {
    let (timescale, duration) = match meta {
        TrackMetadata::Audio(a) => (a.timescale, a.duration),
        TrackMetadata::Video(v) => (v.timescale, v.duration),
    };
    mp4_box(
        b"moov",
        &[&mvhd(timescale, duration as u32), &trak(meta), &mvex(meta.id())],
    )
}

fn put_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(value);
    }
}

fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(100);
    buf.put_slice(&full_box_header(0, 0));
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(timescale);
    buf.put_u32(duration);
    buf.put_u32(0x0001_0000); // rate 1.0
    buf.put_u16(0x0100); // volume 1.0
    buf.put_bytes(0, 10);
    put_matrix(&mut buf);
    buf.put_bytes(0, 24); // pre_defined
    buf.put_u32(0xFFFF_FFFF); // next_track_ID
    mp4_box(b"mvhd", &[&buf])
}

fn trak(meta: &TrackMetadata) -> Vec<u8> {
    mp4_box(b"trak", &[&tkhd(meta), &mdia(meta)])
}

fn tkhd(meta: &TrackMetadata) -> Vec<u8> {
    let (width, height) = match meta {
        TrackMetadata::Video(v) => (v.present_width, v.present_height),
        TrackMetadata::Audio(_) => (0, 0),
    };
    let mut buf = BytesMut::with_capacity(84);
    buf.put_slice(&full_box_header(0, 0x07)); // enabled, in movie, in preview
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(meta.id());
    buf.put_u32(0);
    buf.put_u32(meta.duration() as u32);
    buf.put_bytes(0, 8);
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate_group
    buf.put_u16(0); // volume
    buf.put_u16(0);
    put_matrix(&mut buf);
    buf.put_u16(width as u16);
    buf.put_u16(0);
    buf.put_u16(height as u16);
    buf.put_u16(0);
    mp4_box(b"tkhd", &[&buf])
}

fn mdia(meta: &TrackMetadata) -> Vec<u8> {
    mp4_box(b"mdia", &[&mdhd(meta), &hdlr(meta), &minf(meta)])
}

fn mdhd(meta: &TrackMetadata) -> Vec<u8> {
    let timescale = match meta {
        TrackMetadata::Audio(a) => a.timescale,
        TrackMetadata::Video(v) => v.timescale,
    };
    let mut buf = BytesMut::with_capacity(24);
    buf.put_slice(&full_box_header(0, 0));
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(timescale);
    buf.put_u32(meta.duration() as u32);
    buf.put_u16(0x55C4); // language "und"
    buf.put_u16(0);
    mp4_box(b"mdhd", &[&buf])
}

fn hdlr(meta: &TrackMetadata) -> Vec<u8> {
    let (handler_type, name): (&[u8; 4], &[u8]) = match meta {
        TrackMetadata::Audio(_) => (b"soun", b"SoundHandler\0"),
        TrackMetadata::Video(_) => (b"vide", b"VideoHandler\0"),
    };
    let mut buf = BytesMut::with_capacity(37);
    buf.put_slice(&full_box_header(0, 0));
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler_type);
    buf.put_bytes(0, 12);
    buf.put_slice(name);
    mp4_box(b"hdlr", &[&buf])
}

fn minf(meta: &TrackMetadata) -> Vec<u8> {
    let header = match meta {
        TrackMetadata::Audio(_) => mp4_box(b"smhd", &[&[0u8; 8]]),
        TrackMetadata::Video(_) => mp4_box(b"vmhd", &[&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]]),
    };
    let url = mp4_box(b"url ", &[&full_box_header(0, 1)]);
    let dref = mp4_box(b"dref", &[&full_box_header(0, 0), &1u32.to_be_bytes(), &url]);
    let dinf = mp4_box(b"dinf", &[&dref]);
    mp4_box(b"minf", &[&header, &dinf, &stbl(meta)])
}

fn stbl(meta: &TrackMetadata) -> Vec<u8> {
    let empty = [0u8; 8];
    mp4_box(
        b"stbl",
        &[
            &stsd(meta),
            &mp4_box(b"stts", &[&empty]),
            &mp4_box(b"stsc", &[&empty]),
            &mp4_box(b"stsz", &[&[0u8; 12]]),
            &mp4_box(b"stco", &[&empty]),
        ],
    )
}

fn stsd(meta: &TrackMetadata) -> Vec<u8> {
    let entry = match meta {
        TrackMetadata::Audio(audio) => audio_sample_entry(audio),
        TrackMetadata::Video(video) => visual_sample_entry(video),
    };
    mp4_box(b"stsd", &[&full_box_header(0, 0), &1u32.to_be_bytes(), &entry])
}

fn audio_entry_fields(audio: &AudioMetadata) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(28);
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 8);
    buf.put_u16(audio.channel_count as u16);
    buf.put_u16(16); // samplesize
    buf.put_u32(0);
    buf.put_u16(audio.sample_rate as u16);
    buf.put_u16(0);
    buf.to_vec()
}

fn audio_sample_entry(audio: &AudioMetadata) -> Vec<u8> {
    let fields = audio_entry_fields(audio);
    let config = audio.config.as_deref().unwrap_or_default();
    match audio.codec.as_str() {
        "mp3" => mp4_box(b".mp3", &[&fields]),
        "ac-3" => mp4_box(b"ac-3", &[&fields, &mp4_box(b"dac3", &[config])]),
        "ec-3" => mp4_box(b"ec-3", &[&fields, &mp4_box(b"dec3", &[config])]),
        "opus" => mp4_box(b"Opus", &[&fields, &dops(audio)]),
        _ => mp4_box(b"mp4a", &[&fields, &esds(config)]),
    }
}

fn esds(config: &[u8]) -> Vec<u8> {
    let len = config.len() as u8;
    let mut buf = BytesMut::with_capacity(32 + config.len());
    buf.put_slice(&full_box_header(0, 0));
    buf.put_u8(0x03); // ES_DescrTag
    buf.put_u8(23 + len);
    buf.put_u16(0x0001); // ES_ID
    buf.put_u8(0x00);
    buf.put_u8(0x04); // DecoderConfigDescrTag
    buf.put_u8(15 + len);
    buf.put_u8(0x40); // MPEG-4 audio
    buf.put_u8(0x15); // audio stream
    buf.put_bytes(0, 3); // bufferSizeDB
    buf.put_u32(0); // maxBitrate
    buf.put_u32(0); // avgBitrate
    buf.put_u8(0x05); // DecSpecificInfoTag
    buf.put_u8(len);
    buf.put_slice(config);
    buf.put_slice(&[0x06, 0x01, 0x02]); // SLConfigDescriptor
    mp4_box(b"esds", &[&buf])
}

fn dops(audio: &AudioMetadata) -> Vec<u8> {
    if let Some(config) = &audio.config {
        return mp4_box(b"dOps", &[config]);
    }
    let config = crate::codec::opus::OpusConfig {
        channel_count: audio.channel_count,
        channel_config_code: audio.channel_config_code.unwrap_or(0),
        sample_rate: audio.sample_rate,
    };
    mp4_box(b"dOps", &[&crate::codec::opus::build_dops(&config)])
}

fn visual_sample_entry(video: &VideoMetadata) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(78);
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 16);
    buf.put_u16(video.codec_width as u16);
    buf.put_u16(video.codec_height as u16);
    buf.put_u32(0x0048_0000); // horizresolution 72 dpi
    buf.put_u32(0x0048_0000); // vertresolution 72 dpi
    buf.put_u32(0);
    buf.put_u16(1); // frame_count
    buf.put_u8(COMPRESSOR_NAME.len() as u8);
    buf.put_slice(COMPRESSOR_NAME);
    buf.put_bytes(0, 31 - COMPRESSOR_NAME.len());
    buf.put_u16(0x0018); // depth
    buf.put_u16(0xFFFF); // pre_defined

    match &video.config {
        VideoConfig::Avc(avcc) => mp4_box(b"avc1", &[&buf, &mp4_box(b"avcC", &[avcc])]),
        VideoConfig::Hevc(hvcc) => mp4_box(b"hvc1", &[&buf, &mp4_box(b"hvcC", &[hvcc])]),
        VideoConfig::Av1(av1c) => mp4_box(b"av01", &[&buf, &mp4_box(b"av1C", &[av1c])]),
    }
}

fn mvex(track_id: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_slice(&full_box_header(0, 0));
    buf.put_u32(track_id);
    buf.put_u32(1); // default_sample_description_index
    buf.put_u32(0); // default_sample_duration
    buf.put_u32(0); // default_sample_size
    buf.put_u32(0x0001_0001); // default_sample_flags
    mp4_box(b"mvex", &[&mp4_box(b"trex", &[&buf])])
}

/// `moof` for one track fragment. The `trun` data offset points just past
/// the header of the `mdat` that must immediately follow.
pub fn moof(
    sequence_number: u32,
    track_id: u32,
    base_media_decode_time: u32,
    samples: &[FragmentSample],
) -> Vec<u8> {
    let mut mfhd = BytesMut::with_capacity(8);
    mfhd.put_slice(&full_box_header(0, 0));
    mfhd.put_u32(sequence_number);
    let mfhd = mp4_box(b"mfhd", &[&mfhd]);

    let mut tfhd = BytesMut::with_capacity(8);
    tfhd.put_slice(&full_box_header(0, 0));
    tfhd.put_u32(track_id);
    let tfhd = mp4_box(b"tfhd", &[&tfhd]);

    let mut tfdt = BytesMut::with_capacity(8);
    tfdt.put_slice(&full_box_header(0, 0));
    tfdt.put_u32(base_media_decode_time);
    let tfdt = mp4_box(b"tfdt", &[&tfdt]);

    let sdtp = sdtp(samples);
    let trun_size = 8 + 12 + 16 * samples.len();
    // moof header + mfhd + traf header + tfhd + tfdt + trun + sdtp + mdat header
    let data_offset = 8 + mfhd.len() + 8 + tfhd.len() + tfdt.len() + trun_size + sdtp.len() + 8;
    let trun = trun(samples, data_offset as u32);

    let traf = mp4_box(b"traf", &[&tfhd, &tfdt, &trun, &sdtp]);
    mp4_box(b"moof", &[&mfhd, &traf])
}

fn sdtp(samples: &[FragmentSample]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + samples.len());
    buf.put_slice(&full_box_header(0, 0));
    for sample in samples {
        let f = sample.flags;
        buf.put_u8(f.is_leading << 6 | f.depends_on << 4 | f.is_depended_on << 2 | f.has_redundancy);
    }
    mp4_box(b"sdtp", &[&buf])
}

fn trun(samples: &[FragmentSample], data_offset: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(12 + 16 * samples.len());
    // data-offset, duration, size, flags and composition time offset present
    buf.put_slice(&full_box_header(0, 0x000F01));
    buf.put_u32(samples.len() as u32);
    buf.put_u32(data_offset);
    for sample in samples {
        let f = sample.flags;
        buf.put_u32(sample.duration);
        buf.put_u32(sample.size);
        buf.put_u8(f.is_leading << 2 | f.depends_on);
        buf.put_u8(f.is_depended_on << 6 | f.has_redundancy << 4 | f.is_non_sync);
        buf.put_u16(0);
        buf.put_i32(sample.cts);
    }
    mp4_box(b"trun", &[&buf])
}

/// `mdat` wrapping already concatenated sample payloads.
pub fn mdat(payload: &[u8]) -> Vec<u8> {
    mp4_box(b"mdat", &[payload])
}
