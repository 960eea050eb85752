use bytes::Bytes;

/// MPEG-4 sampling frequencies indexed by `sampling_frequency_index`.
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

pub fn sampling_frequency(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(index as usize).copied()
}

#[derive(Debug)]
pub struct AdtsHeader {
    pub sync_word: u32,             // 12 bits
    pub id: u8,                     // 1 bit, 0=MPEG-4, 1=MPEG-2
    pub layer: u8,                  // 2 bits
    pub protection_absent: bool,    // 1 bit
    pub profile: u8,                // 2 bits, audio object type - 1
    pub sample_rate_index: u8,      // 4 bits
    pub channel_configuration: u8,  // 3 bits
    pub frame_length: u16,          // 13 bits, header included
    pub number_of_raw_blocks: u8,   // 2 bits
}

impl AdtsHeader {
    pub fn header_length(&self) -> usize {
        if self.protection_absent {
            7
        } else {
            9
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        sampling_frequency(self.sample_rate_index)
    }
}

/// One raw AAC access unit together with the stream configuration it was
/// framed with.
#[derive(Debug, Clone, PartialEq)]
pub struct AacFrame {
    pub audio_object_type: u8,
    pub sampling_freq_index: u8,
    pub sampling_frequency: u32,
    pub channel_config: u8,
    /// Only meaningful for LOAS framing.
    pub other_data_present: bool,
    pub data: Bytes,
}

impl AacFrame {
    /// Whether `other` was produced by a different stream configuration.
    pub fn config_differs(&self, other: &AacFrame) -> bool {
        self.audio_object_type != other.audio_object_type
            || self.sampling_freq_index != other.sampling_freq_index
            || self.channel_config != other.channel_config
    }
}
