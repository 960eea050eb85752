//! SCTE-35 `splice_info_section` decoding.
//!
//! The full section is decoded into [`SpliceInfoSection`]; [`parse_scte35`]
//! additionally resolves the scheduled splice PTS (90 kHz, `pts_adjustment`
//! applied modulo 2^33) for `splice_insert` program splices and
//! `time_signal` commands.

use bytes::Bytes;

use crate::utils::BitReader;
use crate::Result;

const PTS_MODULO: u64 = 1 << 33;

pub const SPLICE_NULL: u8 = 0x00;
pub const SPLICE_SCHEDULE: u8 = 0x04;
pub const SPLICE_INSERT: u8 = 0x05;
pub const TIME_SIGNAL: u8 = 0x06;
pub const BANDWIDTH_RESERVATION: u8 = 0x07;
pub const PRIVATE_COMMAND: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceTime {
    pub time_specified_flag: bool,
    pub pts_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakDuration {
    pub auto_return: bool,
    /// 90 kHz ticks.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleComponent {
    pub component_tag: u8,
    pub utc_splice_time: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScheduleEvent {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub duration_flag: bool,
    pub utc_splice_time: Option<u32>,
    pub components: Vec<ScheduleComponent>,
    pub break_duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertComponent {
    pub component_tag: u8,
    pub splice_time: Option<SpliceTime>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpliceInsert {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub duration_flag: bool,
    pub splice_immediate_flag: bool,
    pub splice_time: Option<SpliceTime>,
    pub components: Vec<InsertComponent>,
    pub break_duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceCommand {
    Null,
    Schedule(Vec<ScheduleEvent>),
    Insert(SpliceInsert),
    TimeSignal(SpliceTime),
    BandwidthReservation,
    Private {
        identifier: String,
        private_data: Vec<u8>,
    },
    /// Reserved command type; its bytes are skipped.
    Reserved(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioComponent {
    pub component_tag: u8,
    pub iso_code: String,
    pub bit_stream_mode: u8,
    pub num_channels: u8,
    pub full_srvc_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationComponent {
    pub component_tag: u8,
    pub pts_offset: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentationDescriptor {
    pub identifier: String,
    pub segmentation_event_id: u32,
    pub segmentation_event_cancel_indicator: bool,
    pub program_segmentation_flag: bool,
    pub segmentation_duration_flag: bool,
    pub delivery_not_restricted_flag: bool,
    pub web_delivery_allowed_flag: Option<bool>,
    pub no_regional_blackout_flag: Option<bool>,
    pub archive_allowed_flag: Option<bool>,
    pub device_restrictions: Option<u8>,
    pub components: Vec<SegmentationComponent>,
    pub segmentation_duration: Option<u64>,
    pub segmentation_upid_type: u8,
    pub segmentation_upid: Vec<u8>,
    pub segmentation_type_id: u8,
    pub segment_num: u8,
    pub segments_expected: u8,
    pub sub_segment_num: Option<u8>,
    pub sub_segments_expected: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceDescriptor {
    Avail {
        identifier: String,
        provider_avail_id: u32,
    },
    Dtmf {
        identifier: String,
        preroll: u8,
        dtmf_chars: String,
    },
    Segmentation(SegmentationDescriptor),
    Time {
        identifier: String,
        tai_seconds: u64,
        tai_ns: u32,
        utc_offset: u16,
    },
    Audio {
        identifier: String,
        components: Vec<AudioComponent>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceInfoSection {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub section_length: u16,
    pub protocol_version: u8,
    pub encrypted_packet: bool,
    pub encryption_algorithm: u8,
    pub pts_adjustment: u64,
    pub cw_index: u8,
    pub tier: u16,
    pub splice_command_length: u16,
    pub splice_command_type: u8,
    pub splice_command: SpliceCommand,
    pub descriptor_loop_length: u16,
    pub splice_descriptors: Vec<SpliceDescriptor>,
    pub e_crc32: Option<u32>,
    pub crc32: u32,
}

/// A decoded splice section together with its resolved schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Scte35Data {
    pub splice_command_type: u8,
    /// Splice point in 90 kHz units, `pts_adjustment` applied.
    pub pts: Option<u64>,
    pub auto_return: Option<bool>,
    /// Break duration in milliseconds.
    pub duration: Option<f64>,
    pub detail: SpliceInfoSection,
    /// The raw section bytes.
    pub data: Bytes,
}

fn read_u64(reader: &mut BitReader, n: u32) -> Result<u64> {
    if n > 32 {
        let high = reader.read_bits(n - 32)? as u64;
        Ok(high << 32 | reader.read_bits(32)? as u64)
    } else {
        Ok(reader.read_bits(n)? as u64)
    }
}

fn read_string(reader: &mut BitReader, n: usize) -> Result<String> {
    let mut s = String::with_capacity(n);
    for _ in 0..n {
        s.push(reader.read_byte()? as char);
    }
    Ok(s)
}

fn parse_splice_time(reader: &mut BitReader) -> Result<SpliceTime> {
    let time_specified_flag = reader.read_bool()?;
    if time_specified_flag {
        reader.skip_bits(6)?;
        Ok(SpliceTime {
            time_specified_flag,
            pts_time: Some(read_u64(reader, 33)?),
        })
    } else {
        reader.skip_bits(7)?;
        Ok(SpliceTime {
            time_specified_flag,
            pts_time: None,
        })
    }
}

fn parse_break_duration(reader: &mut BitReader) -> Result<BreakDuration> {
    let auto_return = reader.read_bool()?;
    reader.skip_bits(6)?;
    Ok(BreakDuration {
        auto_return,
        duration: read_u64(reader, 33)?,
    })
}

fn parse_schedule_event(reader: &mut BitReader) -> Result<ScheduleEvent> {
    let mut event = ScheduleEvent {
        splice_event_id: reader.read_bits(32)?,
        splice_event_cancel_indicator: reader.read_bool()?,
        ..Default::default()
    };
    reader.skip_bits(7)?;
    if event.splice_event_cancel_indicator {
        return Ok(event);
    }

    event.out_of_network_indicator = reader.read_bool()?;
    event.program_splice_flag = reader.read_bool()?;
    event.duration_flag = reader.read_bool()?;
    reader.skip_bits(5)?;
    if event.program_splice_flag {
        event.utc_splice_time = Some(reader.read_bits(32)?);
    } else {
        let count = reader.read_byte()?;
        for _ in 0..count {
            event.components.push(ScheduleComponent {
                component_tag: reader.read_byte()?,
                utc_splice_time: reader.read_bits(32)?,
            });
        }
    }
    if event.duration_flag {
        event.break_duration = Some(parse_break_duration(reader)?);
    }
    event.unique_program_id = reader.read_bits(16)? as u16;
    event.avail_num = reader.read_byte()?;
    event.avails_expected = reader.read_byte()?;
    Ok(event)
}

fn parse_splice_insert(reader: &mut BitReader) -> Result<SpliceInsert> {
    let mut insert = SpliceInsert {
        splice_event_id: reader.read_bits(32)?,
        splice_event_cancel_indicator: reader.read_bool()?,
        ..Default::default()
    };
    reader.skip_bits(7)?;
    if insert.splice_event_cancel_indicator {
        return Ok(insert);
    }

    insert.out_of_network_indicator = reader.read_bool()?;
    insert.program_splice_flag = reader.read_bool()?;
    insert.duration_flag = reader.read_bool()?;
    insert.splice_immediate_flag = reader.read_bool()?;
    reader.skip_bits(4)?;
    if insert.program_splice_flag && !insert.splice_immediate_flag {
        insert.splice_time = Some(parse_splice_time(reader)?);
    }
    if !insert.program_splice_flag {
        let count = reader.read_byte()?;
        for _ in 0..count {
            let component_tag = reader.read_byte()?;
            let splice_time = if insert.splice_immediate_flag {
                None
            } else {
                Some(parse_splice_time(reader)?)
            };
            insert.components.push(InsertComponent {
                component_tag,
                splice_time,
            });
        }
    }
    if insert.duration_flag {
        insert.break_duration = Some(parse_break_duration(reader)?);
    }
    insert.unique_program_id = reader.read_bits(16)? as u16;
    insert.avail_num = reader.read_byte()?;
    insert.avails_expected = reader.read_byte()?;
    Ok(insert)
}

fn parse_segmentation_descriptor(
    reader: &mut BitReader,
    identifier: String,
) -> Result<SegmentationDescriptor> {
    let mut desc = SegmentationDescriptor {
        identifier,
        segmentation_event_id: reader.read_bits(32)?,
        segmentation_event_cancel_indicator: reader.read_bool()?,
        ..Default::default()
    };
    reader.skip_bits(7)?;
    if desc.segmentation_event_cancel_indicator {
        return Ok(desc);
    }

    desc.program_segmentation_flag = reader.read_bool()?;
    desc.segmentation_duration_flag = reader.read_bool()?;
    desc.delivery_not_restricted_flag = reader.read_bool()?;
    if desc.delivery_not_restricted_flag {
        reader.skip_bits(5)?;
    } else {
        desc.web_delivery_allowed_flag = Some(reader.read_bool()?);
        desc.no_regional_blackout_flag = Some(reader.read_bool()?);
        desc.archive_allowed_flag = Some(reader.read_bool()?);
        desc.device_restrictions = Some(reader.read_bits(2)? as u8);
    }
    if !desc.program_segmentation_flag {
        let count = reader.read_byte()?;
        for _ in 0..count {
            let component_tag = reader.read_byte()?;
            reader.skip_bits(7)?;
            desc.components.push(SegmentationComponent {
                component_tag,
                pts_offset: read_u64(reader, 33)?,
            });
        }
    }
    if desc.segmentation_duration_flag {
        desc.segmentation_duration = Some(read_u64(reader, 40)?);
    }
    desc.segmentation_upid_type = reader.read_byte()?;
    let upid_length = reader.read_byte()?;
    for _ in 0..upid_length {
        desc.segmentation_upid.push(reader.read_byte()?);
    }
    desc.segmentation_type_id = reader.read_byte()?;
    desc.segment_num = reader.read_byte()?;
    desc.segments_expected = reader.read_byte()?;
    if matches!(desc.segmentation_type_id, 0x34 | 0x36 | 0x38 | 0x3A) {
        desc.sub_segment_num = Some(reader.read_byte()?);
        desc.sub_segments_expected = Some(reader.read_byte()?);
    }
    Ok(desc)
}

fn parse_descriptor(
    reader: &mut BitReader,
    tag: u8,
    length: u8,
    identifier: String,
) -> Result<Option<SpliceDescriptor>> {
    let descriptor = match tag {
        0x00 => SpliceDescriptor::Avail {
            identifier,
            provider_avail_id: reader.read_bits(32)?,
        },
        0x01 => {
            let preroll = reader.read_byte()?;
            let count = reader.read_bits(3)? as usize;
            reader.skip_bits(5)?;
            SpliceDescriptor::Dtmf {
                identifier,
                preroll,
                dtmf_chars: read_string(reader, count)?,
            }
        }
        0x02 => SpliceDescriptor::Segmentation(parse_segmentation_descriptor(reader, identifier)?),
        0x03 => SpliceDescriptor::Time {
            identifier,
            tai_seconds: read_u64(reader, 48)?,
            tai_ns: reader.read_bits(32)?,
            utc_offset: reader.read_bits(16)? as u16,
        },
        0x04 => {
            let count = reader.read_bits(4)?;
            let mut components = Vec::with_capacity(count as usize);
            for _ in 0..count {
                components.push(AudioComponent {
                    component_tag: reader.read_byte()?,
                    iso_code: read_string(reader, 3)?,
                    bit_stream_mode: reader.read_bits(3)? as u8,
                    num_channels: reader.read_bits(4)? as u8,
                    full_srvc_audio: reader.read_bool()?,
                });
            }
            SpliceDescriptor::Audio {
                identifier,
                components,
            }
        }
        _ => {
            reader.skip_bits((length as u32).saturating_sub(4) * 8)?;
            return Ok(None);
        }
    };
    Ok(Some(descriptor))
}

/// Decodes a complete `splice_info_section` (table_id `0xFC`).
pub fn parse_splice_info_section(section: &[u8]) -> Result<SpliceInfoSection> {
    let mut reader = BitReader::new(section);

    let table_id = reader.read_byte()?;
    let section_syntax_indicator = reader.read_bool()?;
    let private_indicator = reader.read_bool()?;
    reader.skip_bits(2)?;
    let section_length = reader.read_bits(12)? as u16;
    let protocol_version = reader.read_byte()?;
    let encrypted_packet = reader.read_bool()?;
    let encryption_algorithm = reader.read_bits(6)? as u8;
    let pts_adjustment = read_u64(&mut reader, 33)?;
    let cw_index = reader.read_byte()?;
    let tier = reader.read_bits(12)? as u16;
    let splice_command_length = reader.read_bits(12)? as u16;
    let splice_command_type = reader.read_byte()?;

    let splice_command = match splice_command_type {
        SPLICE_NULL => SpliceCommand::Null,
        SPLICE_SCHEDULE => {
            let count = reader.read_byte()?;
            let mut events = Vec::with_capacity(count as usize);
            for _ in 0..count {
                events.push(parse_schedule_event(&mut reader)?);
            }
            SpliceCommand::Schedule(events)
        }
        SPLICE_INSERT => SpliceCommand::Insert(parse_splice_insert(&mut reader)?),
        TIME_SIGNAL => SpliceCommand::TimeSignal(parse_splice_time(&mut reader)?),
        BANDWIDTH_RESERVATION => SpliceCommand::BandwidthReservation,
        PRIVATE_COMMAND => {
            let identifier = read_string(&mut reader, 4)?;
            let mut private_data = Vec::new();
            for _ in 0..splice_command_length.saturating_sub(4) {
                private_data.push(reader.read_byte()?);
            }
            SpliceCommand::Private {
                identifier,
                private_data,
            }
        }
        other => {
            reader.skip_bits(splice_command_length as u32 * 8)?;
            SpliceCommand::Reserved(other)
        }
    };

    let descriptor_loop_length = reader.read_bits(16)? as u16;
    let mut splice_descriptors = Vec::new();
    let mut consumed = 0u32;
    while consumed < descriptor_loop_length as u32 {
        let tag = reader.read_byte()?;
        let length = reader.read_byte()?;
        let identifier = read_string(&mut reader, 4)?;
        if let Some(descriptor) = parse_descriptor(&mut reader, tag, length, identifier)? {
            splice_descriptors.push(descriptor);
        }
        consumed += 2 + length as u32;
    }

    let e_crc32 = if encrypted_packet {
        Some(reader.read_bits(32)?)
    } else {
        None
    };
    let crc32 = reader.read_bits(32)?;

    Ok(SpliceInfoSection {
        table_id,
        section_syntax_indicator,
        private_indicator,
        section_length,
        protocol_version,
        encrypted_packet,
        encryption_algorithm,
        pts_adjustment,
        cw_index,
        tier,
        splice_command_length,
        splice_command_type,
        splice_command,
        descriptor_loop_length,
        splice_descriptors,
        e_crc32,
        crc32,
    })
}

/// Decodes a section and resolves its splice schedule.
pub fn parse_scte35(section: &[u8]) -> Result<Scte35Data> {
    let detail = parse_splice_info_section(section)?;
    let adjust = |pts_time: u64| (detail.pts_adjustment + pts_time) % PTS_MODULO;

    let (pts, auto_return, duration) = match &detail.splice_command {
        SpliceCommand::Insert(insert) if !insert.splice_event_cancel_indicator => {
            let auto_return = insert.break_duration.as_ref().map(|d| d.auto_return);
            let duration = insert.break_duration.as_ref().map(|d| d.duration as f64 / 90.0);
            let pts = if insert.program_splice_flag && !insert.splice_immediate_flag {
                insert.splice_time.as_ref().and_then(|t| t.pts_time).map(adjust)
            } else {
                None
            };
            (pts, auto_return, duration)
        }
        SpliceCommand::TimeSignal(time) => (time.pts_time.map(adjust), None, None),
        _ => (None, None, None),
    };

    Ok(Scte35Data {
        splice_command_type: detail.splice_command_type,
        pts,
        auto_return,
        duration,
        detail,
        data: Bytes::copy_from_slice(section),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bits::test_utils::BitWriter;
    use pretty_assertions::assert_eq;

    fn section(pts_adjustment: u64, command_type: u8, command: &[u8], descriptors: &[u8]) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.bits(8, 0xFC).flag(false).flag(false).bits(2, 3);
        w.bits(12, (11 + command.len() + 2 + descriptors.len() + 4) as u64);
        w.bits(8, 0).flag(false).bits(6, 0).bits(33, pts_adjustment);
        w.bits(8, 0).bits(12, 0xFFF).bits(12, command.len() as u64).bits(8, command_type as u64);
        for &b in command {
            w.bits(8, b as u64);
        }
        w.bits(16, descriptors.len() as u64);
        for &b in descriptors {
            w.bits(8, b as u64);
        }
        w.bits(32, 0xDEADBEEF);
        w.into_bytes()
    }

    #[test]
    fn test_time_signal_with_adjustment_wraps() {
        let mut w = BitWriter::new();
        w.flag(true).bits(6, 0x3F).bits(33, (1 << 33) - 90_000);
        let data = section(180_000, TIME_SIGNAL, &w.into_bytes(), &[]);

        let parsed = parse_scte35(&data).unwrap();
        assert_eq!(parsed.splice_command_type, TIME_SIGNAL);
        assert_eq!(parsed.pts, Some(90_000));
        assert_eq!(parsed.detail.crc32, 0xDEADBEEF);
        assert_eq!(parsed.data.len(), data.len());
    }

    #[test]
    fn test_splice_insert_program_splice() {
        let mut w = BitWriter::new();
        w.bits(32, 42).flag(false).bits(7, 0x7F);
        w.flag(true).flag(true).flag(true).flag(false).bits(4, 0xF);
        w.flag(true).bits(6, 0x3F).bits(33, 900_000); // splice_time
        w.flag(true).bits(6, 0x3F).bits(33, 2_700_000); // break_duration
        w.bits(16, 7).bits(8, 1).bits(8, 2);
        let data = section(0, SPLICE_INSERT, &w.into_bytes(), &[]);

        let parsed = parse_scte35(&data).unwrap();
        assert_eq!(parsed.pts, Some(900_000));
        assert_eq!(parsed.auto_return, Some(true));
        assert_eq!(parsed.duration, Some(30_000.0));
        match parsed.detail.splice_command {
            SpliceCommand::Insert(insert) => {
                assert_eq!(insert.splice_event_id, 42);
                assert!(insert.out_of_network_indicator);
                assert_eq!(insert.unique_program_id, 7);
                assert_eq!(insert.avails_expected, 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_immediate_insert_has_no_pts() {
        let mut w = BitWriter::new();
        w.bits(32, 1).flag(false).bits(7, 0x7F);
        w.flag(false).flag(true).flag(false).flag(true).bits(4, 0xF);
        w.bits(16, 0).bits(8, 0).bits(8, 0);
        let parsed = parse_scte35(&section(0, SPLICE_INSERT, &w.into_bytes(), &[])).unwrap();
        assert_eq!(parsed.pts, None);
        assert_eq!(parsed.duration, None);
    }

    #[test]
    fn test_descriptors() {
        let mut w = BitWriter::new();
        // avail_descriptor
        w.bits(8, 0x00).bits(8, 8);
        w.bits(32, u32::from_be_bytes(*b"CUEI") as u64).bits(32, 0x1234);
        // dtmf_descriptor
        w.bits(8, 0x01).bits(8, 8);
        w.bits(32, u32::from_be_bytes(*b"CUEI") as u64).bits(8, 5).bits(3, 2).bits(5, 0x1F);
        w.bits(8, b'1' as u64).bits(8, b'#' as u64);
        // unknown tag, skipped
        w.bits(8, 0x7E).bits(8, 6);
        w.bits(32, u32::from_be_bytes(*b"ABCD") as u64).bits(16, 0);
        let descriptors = w.into_bytes();

        let parsed = parse_splice_info_section(&section(0, SPLICE_NULL, &[], &descriptors)).unwrap();
        assert_eq!(parsed.splice_command, SpliceCommand::Null);
        assert_eq!(
            parsed.splice_descriptors,
            vec![
                SpliceDescriptor::Avail {
                    identifier: "CUEI".into(),
                    provider_avail_id: 0x1234,
                },
                SpliceDescriptor::Dtmf {
                    identifier: "CUEI".into(),
                    preroll: 5,
                    dtmf_chars: "1#".into(),
                },
            ]
        );
    }

    #[test]
    fn test_truncated_section() {
        let data = section(0, SPLICE_NULL, &[], &[]);
        assert!(parse_splice_info_section(&data[..10]).is_err());
    }
}
