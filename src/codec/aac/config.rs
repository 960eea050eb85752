use super::types::{sampling_frequency, AacFrame};

/// `AudioSpecificConfig` written into `esds` for an AAC track.
///
/// HE-AAC (SBR, object type 5) is signalled for every stream except mono
/// streams at 24 kHz or above, so a later profile switch inside the stream
/// does not require a new decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub config: Vec<u8>,
    pub sampling_rate: u32,
    pub channel_count: u8,
    /// Codec string matching the signalled object type.
    pub codec_mimetype: String,
    /// Codec string of the object type found in the stream.
    pub original_codec_mimetype: String,
}

impl AudioSpecificConfig {
    pub fn from_frame(frame: &AacFrame) -> Self {
        let sampling_index = frame.sampling_freq_index & 0x0F;
        let channel_config = frame.channel_config & 0x0F;

        let (audio_object_type, extension_sampling_index) = if sampling_index >= 6 {
            (5u8, sampling_index - 3)
        } else if channel_config == 1 {
            (2u8, sampling_index)
        } else {
            (5u8, sampling_index)
        };

        let mut config = vec![
            audio_object_type << 3 | sampling_index >> 1,
            (sampling_index & 0x01) << 7 | channel_config << 3,
        ];
        if audio_object_type == 5 {
            config[1] |= (extension_sampling_index & 0x0F) >> 1;
            // extension object type forced to AAC-LC
            config.push((extension_sampling_index & 0x01) << 7 | 2 << 2);
            config.push(0);
        }

        Self {
            config,
            sampling_rate: sampling_frequency(sampling_index).unwrap_or(frame.sampling_frequency),
            channel_count: channel_config,
            codec_mimetype: format!("mp4a.40.{}", audio_object_type),
            original_codec_mimetype: format!("mp4a.40.{}", frame.audio_object_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn frame(sampling_freq_index: u8, channel_config: u8) -> AacFrame {
        AacFrame {
            audio_object_type: 2,
            sampling_freq_index,
            sampling_frequency: sampling_frequency(sampling_freq_index).unwrap(),
            channel_config,
            other_data_present: false,
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_stereo_44100_signals_he_aac() {
        let asc = AudioSpecificConfig::from_frame(&frame(4, 2));
        assert_eq!(asc.config, vec![0x2A, 0x12, 0x08, 0x00]);
        assert_eq!(asc.codec_mimetype, "mp4a.40.5");
        assert_eq!(asc.original_codec_mimetype, "mp4a.40.2");
        assert_eq!(asc.sampling_rate, 44100);
        assert_eq!(asc.channel_count, 2);
    }

    #[test]
    fn test_mono_48000_stays_lc() {
        let asc = AudioSpecificConfig::from_frame(&frame(3, 1));
        assert_eq!(asc.config, vec![0x11, 0x88]);
        assert_eq!(asc.codec_mimetype, "mp4a.40.2");
    }

    #[test]
    fn test_low_rate_uses_sbr_extension_index() {
        // 22.05 kHz core, 44.1 kHz extension
        let asc = AudioSpecificConfig::from_frame(&frame(7, 1));
        assert_eq!(asc.config, vec![0x2B, 0x8A, 0x08, 0x00]);
        assert_eq!(asc.codec_mimetype, "mp4a.40.5");
    }
}
