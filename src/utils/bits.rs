use crate::error::{RemuxError, Result};

/// A bit-level reader for H.264/H.265 style bitstreams.
///
/// Bits are consumed MSB-first from a 32-bit cache word that is refilled from
/// the backing slice, up to four bytes at a time. Supports:
/// - Reading up to 32 bits as an unsigned number
/// - Reading unsigned exponential Golomb codes (ue(v))
/// - Reading signed exponential Golomb codes (se(v))
///
/// Example:
/// ```
/// use tsremux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bool().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    current_word: u32,
    current_word_bits_left: u32,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            current_word: 0,
            current_word_bits_left: 0,
        }
    }

    fn fill_current_word(&mut self) -> Result<()> {
        let available = self.data.len().saturating_sub(self.byte_offset);
        if available == 0 {
            return Err(RemuxError::OutOfData);
        }

        let count = available.min(4);
        let mut word = [0u8; 4];
        word[..count].copy_from_slice(&self.data[self.byte_offset..self.byte_offset + count]);
        self.current_word = u32::from_be_bytes(word);
        self.byte_offset += count;
        self.current_word_bits_left = (count * 8) as u32;
        Ok(())
    }

    /// Reads n bits and returns them as a number, MSB first.
    ///
    /// Fails with `InvalidArgument` when n > 32 and with `OutOfData` when
    /// the backing buffer is exhausted.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(RemuxError::InvalidArgument(format!(
                "read_bits: cannot read {} bits at once",
                n
            )));
        }

        let mut value: u64 = 0;
        let mut needed = n;
        while needed > 0 {
            if self.current_word_bits_left == 0 {
                self.fill_current_word()?;
            }
            let take = needed.min(self.current_word_bits_left);
            let chunk = (self.current_word as u64) >> (32 - take);
            value = (value << take) | chunk;
            self.current_word = ((self.current_word as u64) << take) as u32;
            self.current_word_bits_left -= take;
            needed -= take;
        }

        Ok(value as u32)
    }

    /// Reads a single bit, true for 1.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads eight bits.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    fn skip_leading_zeros(&mut self) -> Result<u32> {
        let mut zeros = 0;
        while !self.read_bool()? {
            zeros += 1;
            if zeros > 31 {
                return Err(RemuxError::InvalidData("Exp-Golomb prefix too long".into()));
            }
        }
        Ok(zeros)
    }

    /// Reads an unsigned exponential Golomb code (ue(v)).
    ///
    /// Format: k leading zeros, a marker 1, then k INFO bits.
    /// Value = 2^k + INFO - 1, so "00110" (k=2, INFO=10) decodes to 5.
    pub fn read_ueg(&mut self) -> Result<u32> {
        let zeros = self.skip_leading_zeros()?;
        let info = self.read_bits(zeros)? as u64;
        Ok(((1u64 << zeros) + info - 1) as u32)
    }

    /// Reads a signed exponential Golomb code (se(v)).
    ///
    /// The ue(v) value k maps to +(k+1)/2 when odd and -(k/2) when even.
    pub fn read_seg(&mut self) -> Result<i32> {
        let k = self.read_ueg()? as i64;
        if k & 1 == 1 {
            Ok(((k + 1) >> 1) as i32)
        } else {
            Ok(-((k >> 1) as i32))
        }
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, mut n: u32) -> Result<()> {
        while n > 0 {
            let step = n.min(32);
            self.read_bits(step)?;
            n -= step;
        }
        Ok(())
    }

    /// Skips one ue(v) value.
    pub fn skip_ueg(&mut self) -> Result<()> {
        self.read_ueg().map(|_| ())
    }

    /// Drops the remaining bits of the current byte.
    pub fn align_byte(&mut self) {
        let partial = self.current_word_bits_left % 8;
        self.current_word = ((self.current_word as u64) << partial) as u32;
        self.current_word_bits_left -= partial;
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len() - self.byte_offset) * 8 + self.current_word_bits_left as usize
    }

    /// Returns number of bits consumed so far.
    pub fn bits_read(&self) -> usize {
        self.byte_offset * 8 - self.current_word_bits_left as usize
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // Cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        // Crossing the 32-bit cache word
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(28).unwrap(), 0x1234567);
        assert_eq!(reader.read_bits(12).unwrap(), 0x89A);
        assert_eq!(reader.read_bits(8).unwrap(), 0xBC);
    }

    #[test]
    fn test_read_full_word() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x01];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_byte().unwrap(), 0x01);
    }

    #[test]
    fn test_error_conditions() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            reader.read_bits(33),
            Err(RemuxError::InvalidArgument(_))
        ));

        reader.read_bits(8).unwrap();
        assert!(matches!(reader.read_bool(), Err(RemuxError::OutOfData)));

        let data = vec![0; 5];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_ueg().is_err());
    }

    #[test]
    fn test_read_ueg() {
        let test_cases = [
            ([0b10000000], 0, "1"),
            ([0b01000000], 1, "010"),
            ([0b01100000], 2, "011"),
            ([0b00100000], 3, "00100"),
            ([0b00101000], 4, "00101"),
            ([0b00110000], 5, "00110"),
            ([0b00111000], 6, "00111"),
            ([0b00010000], 7, "0001000"),
            ([0b00010010], 8, "0001001"),
        ];

        for (input, expected, pattern) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_ueg().unwrap(), *expected, "pattern {}", pattern);
        }
    }

    #[test]
    fn test_read_seg() {
        let test_cases = [
            ([0b10000000], 0),
            ([0b01000000], 1),
            ([0b01100000], -1),
            ([0b00100000], 2),
            ([0b00101000], -2),
            ([0b00110000], 3),
            ([0b00111000], -3),
        ];

        for (input, expected) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_seg().unwrap(), *expected);
        }
    }

    #[test]
    fn test_align_and_counters() {
        let data = [0xFF, 0x5A];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        assert_eq!(reader.bits_read(), 3);
        reader.align_byte();
        assert_eq!(reader.bits_read(), 8);
        assert_eq!(reader.available_bits(), 8);
        assert_eq!(reader.read_byte().unwrap(), 0x5A);
    }

    #[test]
    fn test_consecutive_golomb() {
        let values = [3, 5, 1, 0, 4, 1023, 65535];
        let encoded = encode_multiple_golomb(&values);
        let mut reader = BitReader::new(&encoded);

        for &expected in &values {
            assert_eq!(reader.read_ueg().unwrap(), expected);
        }
    }

    #[quickcheck]
    fn prop_ueg_round_trip(values: Vec<u32>) -> bool {
        let values: Vec<u32> = values.into_iter().map(|v| v % (1 << 20)).collect();
        let encoded = encode_multiple_golomb(&values);
        let mut reader = BitReader::new(&encoded);
        values
            .iter()
            .all(|&expected| matches!(reader.read_ueg(), Ok(v) if v == expected))
    }

    #[quickcheck]
    fn prop_seg_round_trip(values: Vec<i16>) -> bool {
        let mut writer = BitWriter::new();
        for &v in &values {
            writer.se(v as i32);
        }
        let encoded = writer.into_bytes();
        let mut reader = BitReader::new(&encoded);
        values
            .iter()
            .all(|&expected| matches!(reader.read_seg(), Ok(v) if v == expected as i32))
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = (n % 33) as u32;
        let mut reader = BitReader::new(&data);
        match reader.read_bits(n) {
            Ok(result) => {
                let mut expected = 0u64;
                for i in 0..n as usize {
                    let bit = (data[i / 8] >> (7 - (i % 8))) & 1;
                    expected = (expected << 1) | bit as u64;
                }
                result as u64 == expected
            }
            Err(_) => data.len() * 8 < n as usize,
        }
    }
}
