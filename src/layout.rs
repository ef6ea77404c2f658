//! Sample word layouts for decoding interleaved PCM into 16-bit sample values.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ClipError, Result};

/// How one 16-bit sample is stored inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// Little-endian i16 per sample
    Pcm16,
    /// Little-endian i16 in the upper half of a 4-byte word; the low two bytes are padding
    Pcm16In32,
}

impl SampleLayout {
    /// Select the layout for a container's sample width.
    pub fn from_params(channels: u16, bytes_per_sample: u16) -> Result<Self> {
        if channels == 0 {
            return Err(ClipError::UnsupportedLayout { channels, bytes_per_sample });
        }
        match bytes_per_sample {
            2 => Ok(SampleLayout::Pcm16),
            4 => Ok(SampleLayout::Pcm16In32),
            _ => Err(ClipError::UnsupportedLayout { channels, bytes_per_sample }),
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleLayout::Pcm16 => 2,
            SampleLayout::Pcm16In32 => 4,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SampleLayout::Pcm16 => "s16",
            SampleLayout::Pcm16In32 => "s16-in-s32",
        }
    }

    /// Decode raw interleaved bytes into sample values. Trailing partial words are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Vec<i32> {
        match self {
            SampleLayout::Pcm16 => bytes
                .chunks_exact(2)
                .map(|w| LittleEndian::read_i16(w) as i32)
                .collect(),
            SampleLayout::Pcm16In32 => bytes
                .chunks_exact(4)
                .map(|w| LittleEndian::read_i16(&w[2..4]) as i32)
                .collect(),
        }
    }

    /// Encode sample values back into raw bytes, saturating to the i16 range.
    pub fn encode(&self, samples: &[i32]) -> Vec<u8> {
        let mut out = vec![0u8; samples.len() * self.bytes_per_sample()];
        match self {
            SampleLayout::Pcm16 => {
                for (word, &s) in out.chunks_exact_mut(2).zip(samples) {
                    LittleEndian::write_i16(word, saturate(s));
                }
            }
            SampleLayout::Pcm16In32 => {
                for (word, &s) in out.chunks_exact_mut(4).zip(samples) {
                    LittleEndian::write_i16(&mut word[2..4], saturate(s));
                }
            }
        }
        out
    }
}

fn saturate(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Largest absolute sample value, 0 for an empty slice.
pub fn peak_amplitude(samples: &[i32]) -> u32 {
    samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_params() {
        assert_eq!(SampleLayout::from_params(2, 2).unwrap(), SampleLayout::Pcm16);
        assert_eq!(SampleLayout::from_params(2, 4).unwrap(), SampleLayout::Pcm16In32);
        assert!(SampleLayout::from_params(2, 3).is_err());
        assert!(SampleLayout::from_params(0, 2).is_err());
    }

    #[test]
    fn test_layout_properties() {
        assert_eq!(SampleLayout::Pcm16.bytes_per_sample(), 2);
        assert_eq!(SampleLayout::Pcm16In32.bytes_per_sample(), 4);
        assert_eq!(SampleLayout::Pcm16.as_str(), "s16");
        assert_eq!(SampleLayout::Pcm16In32.as_str(), "s16-in-s32");
    }

    #[test]
    fn test_decode_pcm16() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0xff, 0x7f];
        assert_eq!(SampleLayout::Pcm16.decode(&bytes), vec![1, -1, -32768, 32767]);
    }

    #[test]
    fn test_decode_padded_ignores_low_bytes() {
        let bytes = [0xaa, 0xbb, 0x10, 0x00, 0x12, 0x34, 0xf0, 0xff];
        assert_eq!(SampleLayout::Pcm16In32.decode(&bytes), vec![16, -16]);
    }

    #[test]
    fn test_encode_padded_zeroes_padding() {
        let bytes = SampleLayout::Pcm16In32.encode(&[16, -16]);
        assert_eq!(bytes, vec![0, 0, 0x10, 0x00, 0, 0, 0xf0, 0xff]);
    }

    #[test]
    fn test_encode_saturates() {
        let decoded = SampleLayout::Pcm16.decode(&SampleLayout::Pcm16.encode(&[40000, -40000]));
        assert_eq!(decoded, vec![32767, -32768]);
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[]), 0);
        assert_eq!(peak_amplitude(&[3, -7, 5]), 7);
        assert_eq!(peak_amplitude(&[-32768]), 32768);
    }
}
