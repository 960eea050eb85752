/// CRC32 used by MPEG-2 TS PSI sections (ITU-T H.222.0 / ISO/IEC 13818-1)
/// Polynomial: x32 + x26 + x23 + x22 + x16 + x12 + x11 + x10 + x8 + x7 + x5 + x4 + x2 + x + 1
/// Initial value: 0xFFFFFFFF, no reflection, no final xor
const CRC32_MPEG2: u32 = 0x04C11DB7;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC32_MPEG2
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

/// MPEG-2 CRC32 calculator for PSI and SCTE-35 sections.
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    /// Calculates the checksum of `data`.
    ///
    /// ```
    /// use tsremux::utils::Crc32Mpeg2;
    ///
    /// assert_eq!(Crc32Mpeg2::calculate(&[0x01, 0x01]), 0xD66FB816);
    /// ```
    pub fn calculate(data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ TABLE[index as usize]
        })
    }

    /// Checks a complete section whose last four bytes are its CRC_32.
    ///
    /// Running the CRC over the whole section, CRC field included, yields
    /// zero when the section is intact.
    pub fn verify(section: &[u8]) -> bool {
        section.len() >= 4 && Self::calculate(section) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_known_vectors() {
        assert_eq!(Crc32Mpeg2::calculate(&[0x01, 0x01]), 0xD66FB816);

        // PAT announcing program 1 on PMT PID 0x1000
        let pat = [
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00,
        ];
        assert_eq!(Crc32Mpeg2::calculate(&pat), 0x2AB104B2);
    }

    #[test]
    fn test_verify_section() {
        let section = [
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00, 0x2A, 0xB1,
            0x04, 0xB2,
        ];
        assert!(Crc32Mpeg2::verify(&section));

        let mut corrupted = section;
        corrupted[9] ^= 0x01;
        assert!(!Crc32Mpeg2::verify(&corrupted));
        assert!(!Crc32Mpeg2::verify(&[0x00, 0x01]));
    }

    #[quickcheck]
    fn prop_appended_crc_verifies(data: Vec<u8>) -> bool {
        let crc = Crc32Mpeg2::calculate(&data);
        let mut section = data;
        section.extend_from_slice(&crc.to_be_bytes());
        Crc32Mpeg2::verify(&section)
    }
}
