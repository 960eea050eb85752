//! Pre-encoded silent AAC access units used to fill audio gaps.

const LC_MONO: &[u8] = &[0x00, 0xC8, 0x00, 0x80, 0x23, 0x80];
const LC_STEREO: &[u8] = &[0x21, 0x00, 0x49, 0x90, 0x02, 0x19, 0x00, 0x23, 0x80];
const LC_3CH: &[u8] = &[
    0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x8E,
];
const LC_4CH: &[u8] = &[
    0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x80, 0x2C, 0x80,
    0x08, 0x02, 0x38,
];
const LC_5CH: &[u8] = &[
    0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x82, 0x30, 0x04,
    0x99, 0x00, 0x21, 0x90, 0x02, 0x38,
];
const LC_6CH: &[u8] = &[
    0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x82, 0x30, 0x04,
    0x99, 0x00, 0x21, 0x90, 0x02, 0x00, 0xB2, 0x00, 0x20, 0x08, 0xE0,
];

const HE_MONO_PREFIX: &[u8] = &[
    0x01, 0x40, 0x22, 0x80, 0xA3, 0x4E, 0xE6, 0x80, 0xBA, 0x08, 0x00, 0x00, 0x00, 0x1C, 0x06,
    0xF1, 0xC1, 0x0A,
];
const HE_STEREO_PREFIX: &[u8] = &[
    0x01, 0x40, 0x22, 0x80, 0xA3, 0x5E, 0xE6, 0x80, 0xBA, 0x08, 0x00, 0x00, 0x00, 0x00, 0x95,
    0x00, 0x06, 0xF1, 0xA1, 0x0A,
];

/// Returns one silent access unit for `codec` ("mp4a.40.x") and channel
/// count, or `None` when no frame is known for the combination.
pub fn silent_frame(codec: &str, channel_count: u8) -> Option<Vec<u8>> {
    if codec == "mp4a.40.2" {
        let frame = match channel_count {
            1 => LC_MONO,
            2 => LC_STEREO,
            3 => LC_3CH,
            4 => LC_4CH,
            5 => LC_5CH,
            6 => LC_6CH,
            _ => return None,
        };
        return Some(frame.to_vec());
    }

    let (prefix, fill) = match channel_count {
        1 => (HE_MONO_PREFIX, 40),
        2 | 3 => (HE_STEREO_PREFIX, 38),
        _ => return None,
    };
    let mut frame = Vec::with_capacity(prefix.len() + fill + 1);
    frame.extend_from_slice(prefix);
    frame.resize(prefix.len() + fill, 0x5A);
    frame.push(0x5E);
    Some(frame)
}
