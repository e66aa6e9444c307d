//! XZ variable-length integers.
//!
//! Seven value bits per byte, least significant group first, high bit set
//! on every byte but the last. At most nine bytes, values up to `2^63 - 1`,
//! and the encoding must be minimal (no trailing `0x00` continuation byte).

use crate::error::{Result, XzError};

/// Largest value an XZ VLI can hold.
pub const VLI_MAX: u64 = u64::MAX / 2;

/// Maximum encoded size in bytes.
pub const VLI_BYTES_MAX: usize = 9;

/// Append the encoding of `value` to `out`.
pub fn encode_vli(out: &mut Vec<u8>, mut value: u64) {
    debug_assert!(value <= VLI_MAX);
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Number of bytes `value` takes when encoded.
pub fn vli_size(value: u64) -> usize {
    let mut size = 1;
    let mut rest = value >> 7;
    while rest != 0 {
        size += 1;
        rest >>= 7;
    }
    size
}

/// Decode one VLI from the front of `data`, returning the value and the
/// number of bytes used.
pub fn decode_vli(data: &[u8]) -> Result<(u64, usize)> {
    let mut decoder = VliDecoder::new();
    for (i, &byte) in data.iter().enumerate() {
        if let Some(value) = decoder.push(byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(XzError::corrupted(0, "truncated variable-length integer"))
}

/// Byte-at-a-time VLI decoder, for fields that may straddle input windows.
#[derive(Debug, Clone, Default)]
pub struct VliDecoder {
    value: u64,
    len: usize,
}

impl VliDecoder {
    /// Create a decoder for a fresh integer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns the value once the last byte has been seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<u64>> {
        if self.len >= VLI_BYTES_MAX {
            return Err(XzError::corrupted(0, "variable-length integer too long"));
        }
        self.value |= u64::from(byte & 0x7F) << (7 * self.len);
        self.len += 1;

        if byte & 0x80 != 0 {
            return Ok(None);
        }
        if byte == 0x00 && self.len > 1 {
            return Err(XzError::corrupted(
                0,
                "non-minimal variable-length integer encoding",
            ));
        }

        let value = self.value;
        *self = Self::default();
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_values() {
        let mut out = Vec::new();
        encode_vli(&mut out, 0);
        encode_vli(&mut out, 0x7F);
        encode_vli(&mut out, 0x80);
        encode_vli(&mut out, 300);
        assert_eq!(out, vec![0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(vli_size(0), 1);
        assert_eq!(vli_size(0x7F), 1);
        assert_eq!(vli_size(0x80), 2);
        assert_eq!(vli_size(VLI_MAX), VLI_BYTES_MAX);
    }

    #[test]
    fn test_decode_split_across_pushes() {
        let mut out = Vec::new();
        encode_vli(&mut out, VLI_MAX);
        let mut decoder = VliDecoder::new();
        let (last, head) = out.split_last().unwrap();
        for &byte in head {
            assert_eq!(decoder.push(byte).unwrap(), None);
        }
        assert_eq!(decoder.push(*last).unwrap(), Some(VLI_MAX));
    }

    #[test]
    fn test_decode_rejects_bad_encodings() {
        // Trailing zero continuation.
        assert!(decode_vli(&[0x80, 0x00]).is_err());
        // Ten bytes.
        assert!(decode_vli(&[0xFF; 10]).is_err());
        // Truncated.
        assert!(decode_vli(&[0x80]).is_err());
        assert_eq!(decode_vli(&[0xAC, 0x02, 0xFF]).unwrap(), (300, 2));
    }
}
