//! Bit-level reader/writer over the URL-safe base64 alphabet.
//!
//! Six bits map to one character, most significant bit first. The final
//! group of a written stream is padded with trailing zero bits.

use crate::error::{CodecError, DecodeError};

/// Characters used when encoding, indexed by 6-bit value.
pub const BASE64_ALPHABET: &[u8; 64] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_";

/// The alphabet of the earliest song strings, which used `.` for 62.
pub const LEGACY_BASE64_ALPHABET: &[u8; 64] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ._";

/// Map a character from either alphabet to its 6-bit value.
pub fn base64_value(ch: char) -> Option<u8> {
    match ch {
        '0'..='9' => Some(ch as u8 - b'0'),
        'a'..='z' => Some(ch as u8 - b'a' + 10),
        'A'..='Z' => Some(ch as u8 - b'A' + 36),
        '-' | '.' => Some(62),
        '_' => Some(63),
        _ => None,
    }
}

/// Encode a 6-bit value, failing for anything wider.
pub fn base64_char(field: &'static str, value: usize) -> Result<char, CodecError> {
    BASE64_ALPHABET
        .get(value)
        .map(|&c| c as char)
        .ok_or(CodecError::FieldOverflow {
            field,
            value: value as i64,
            bits: 6,
        })
}

// ── Writer ──────────────────────────────────────────────────

/// An append-only bit buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitFieldWriter {
    bits: Vec<bool>,
}

impl BitFieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Append the low `bit_count` bits of `value`, MSB first.
    pub fn write(&mut self, bit_count: u32, value: usize) {
        for shift in (0..bit_count).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
    }

    /// Append a self-delimiting integer `>= min_value`.
    ///
    /// Each leading `1` bit consumes `2^num_bits` of the value and widens the
    /// remainder field by one bit; a `0` bit ends the prefix.
    pub fn write_long_tail(
        &mut self,
        min_value: usize,
        min_bits: u32,
        value: usize,
    ) -> Result<(), CodecError> {
        if value < min_value {
            return Err(CodecError::BelowMinimum {
                value: value as i64,
                min: min_value as i64,
            });
        }
        let mut value = value - min_value;
        let mut num_bits = min_bits;
        while value >= (1usize << num_bits) {
            self.bits.push(true);
            value -= 1 << num_bits;
            num_bits += 1;
        }
        self.bits.push(false);
        self.write(num_bits, value);
        Ok(())
    }

    pub fn write_part_duration(&mut self, value: usize) -> Result<(), CodecError> {
        self.write_long_tail(1, 2, value)
    }

    pub fn write_pin_count(&mut self, value: usize) -> Result<(), CodecError> {
        self.write_long_tail(1, 0, value)
    }

    /// Sign bit followed by the magnitude, which must be non-zero.
    pub fn write_pitch_interval(&mut self, value: i32) -> Result<(), CodecError> {
        self.write(1, (value < 0) as usize);
        self.write_long_tail(1, 3, value.unsigned_abs() as usize)
    }

    pub fn concat(&mut self, other: &BitFieldWriter) {
        self.bits.extend_from_slice(&other.bits);
    }

    /// Number of characters [`encode_base64`](Self::encode_base64) appends.
    pub fn length_base64(&self) -> usize {
        self.bits.len().div_ceil(6)
    }

    pub fn encode_base64(&self, out: &mut String) {
        for group in self.bits.chunks(6) {
            let mut value = 0usize;
            for i in 0..6 {
                value <<= 1;
                value |= group.get(i).copied().unwrap_or(false) as usize;
            }
            out.push(BASE64_ALPHABET[value] as char);
        }
    }
}

// ── Reader ──────────────────────────────────────────────────

/// Reads bits back out of a run of base64 characters.
#[derive(Debug, Clone)]
pub struct BitFieldReader {
    bits: Vec<bool>,
    read_index: usize,
    /// Character offset of the first bit, for error reporting.
    origin: usize,
}

impl BitFieldReader {
    /// Unpack `source[start..stop]`. A range past the end of the source is
    /// truncated; reads beyond the available bits fail.
    pub fn new(source: &[char], start: usize, stop: usize) -> Result<Self, DecodeError> {
        let stop = stop.min(source.len());
        let start = start.min(stop);
        let mut bits = Vec::with_capacity((stop - start) * 6);
        for (offset, &ch) in source[start..stop].iter().enumerate() {
            let value = base64_value(ch).ok_or(DecodeError::InvalidCharacter {
                ch,
                offset: start + offset,
            })?;
            for shift in (0..6).rev() {
                bits.push((value >> shift) & 1 == 1);
            }
        }
        Ok(Self {
            bits,
            read_index: 0,
            origin: start,
        })
    }

    fn offset(&self) -> usize {
        self.origin + self.read_index / 6
    }

    #[inline]
    fn next_bit(&mut self) -> Result<bool, DecodeError> {
        let bit = self
            .bits
            .get(self.read_index)
            .copied()
            .ok_or(DecodeError::Truncated {
                offset: self.offset(),
            })?;
        self.read_index += 1;
        Ok(bit)
    }

    pub fn read(&mut self, bit_count: u32) -> Result<usize, DecodeError> {
        let mut result = 0usize;
        for _ in 0..bit_count {
            result = (result << 1) | self.next_bit()? as usize;
        }
        Ok(result)
    }

    pub fn read_long_tail(&mut self, min_value: usize, min_bits: u32) -> Result<usize, DecodeError> {
        let mut result = min_value;
        let mut num_bits = min_bits;
        while self.next_bit()? {
            if num_bits >= 31 {
                return Err(DecodeError::LongTailOverflow {
                    offset: self.offset(),
                });
            }
            result += 1 << num_bits;
            num_bits += 1;
        }
        Ok(result + self.read(num_bits)?)
    }

    pub fn read_part_duration(&mut self) -> Result<usize, DecodeError> {
        self.read_long_tail(1, 2)
    }

    pub fn read_pin_count(&mut self) -> Result<usize, DecodeError> {
        self.read_long_tail(1, 0)
    }

    pub fn read_pitch_interval(&mut self) -> Result<i32, DecodeError> {
        let negative = self.read(1)? == 1;
        let magnitude = self.read_long_tail(1, 3)? as i32;
        Ok(if negative { -magnitude } else { magnitude })
    }

    pub fn error_offset(&self) -> usize {
        self.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_for(writer: &BitFieldWriter) -> BitFieldReader {
        let mut encoded = String::new();
        writer.encode_base64(&mut encoded);
        let chars: Vec<char> = encoded.chars().collect();
        BitFieldReader::new(&chars, 0, chars.len()).unwrap()
    }

    #[test]
    fn test_long_tail_round_trip() {
        for &(min_value, min_bits) in &[(0usize, 0u32), (1, 0), (1, 2), (1, 3), (5, 4)] {
            for value in min_value..min_value + 300 {
                let mut writer = BitFieldWriter::new();
                writer.write_long_tail(min_value, min_bits, value).unwrap();
                let mut reader = reader_for(&writer);
                assert_eq!(
                    reader.read_long_tail(min_value, min_bits).unwrap(),
                    value,
                    "min_value={min_value} min_bits={min_bits}"
                );
            }
        }
    }

    #[test]
    fn test_long_tail_small_values_are_short() {
        let mut writer = BitFieldWriter::new();
        writer.write_part_duration(1).unwrap();
        assert_eq!(writer.bit_len(), 3, "smallest duration is 0 + 2 bits");

        let mut writer = BitFieldWriter::new();
        writer.write_long_tail(0, 0, 0).unwrap();
        assert_eq!(writer.bit_len(), 1);
    }

    #[test]
    fn test_long_tail_rejects_values_below_minimum() {
        let mut writer = BitFieldWriter::new();
        let err = writer.write_long_tail(1, 2, 0).unwrap_err();
        assert!(matches!(err, CodecError::BelowMinimum { value: 0, min: 1 }));
    }

    #[test]
    fn test_pitch_interval_sign() {
        let mut writer = BitFieldWriter::new();
        for v in [-40, -1, 1, 7, 8, 9, 40] {
            writer.write_pitch_interval(v).unwrap();
        }
        let mut reader = reader_for(&writer);
        for v in [-40, -1, 1, 7, 8, 9, 40] {
            assert_eq!(reader.read_pitch_interval().unwrap(), v);
        }
    }

    #[test]
    fn test_final_group_is_zero_padded() {
        let mut writer = BitFieldWriter::new();
        writer.write(3, 0b111);
        let mut out = String::new();
        writer.encode_base64(&mut out);
        // 111000 = 56
        assert_eq!(out, "U");
        assert_eq!(writer.length_base64(), 1);
    }

    #[test]
    fn test_read_past_end_is_an_error() {
        let chars: Vec<char> = "0".chars().collect();
        let mut reader = BitFieldReader::new(&chars, 0, 1).unwrap();
        assert_eq!(reader.read(6).unwrap(), 0);
        assert!(matches!(
            reader.read(1),
            Err(DecodeError::Truncated { offset: 1 })
        ));
    }

    #[test]
    fn test_legacy_dot_decodes_as_62() {
        assert_eq!(base64_value('.'), Some(62));
        assert_eq!(base64_value('-'), Some(62));
        assert_eq!(LEGACY_BASE64_ALPHABET[62], b'.');
        assert_eq!(base64_value('!'), None);
    }

    #[test]
    fn test_invalid_character_reports_offset() {
        let chars: Vec<char> = "ab!c".chars().collect();
        let err = BitFieldReader::new(&chars, 0, 4).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidCharacter { ch: '!', offset: 2 }));
    }

    #[test]
    fn test_concat_appends_bits() {
        let mut a = BitFieldWriter::new();
        a.write(2, 0b10);
        let mut b = BitFieldWriter::new();
        b.write(4, 0b0111);
        a.concat(&b);
        let mut reader = reader_for(&a);
        assert_eq!(reader.read(6).unwrap(), 0b100111);
    }
}
