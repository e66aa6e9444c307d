//! Block integrity checks.
//!
//! XZ stores the check kind in the stream flags (4-bit check ID) and one
//! check value after each block. IDs without a known algorithm are still
//! valid: their size is fixed by the ID range, so a decoder can skip them.

use crate::crc::{Crc32, Crc64};
use crate::error::{Result, XzError};
use sha2::{Digest, Sha256};

/// Largest check ID representable in the stream flags.
pub const CHECK_ID_MAX: u8 = 0x0F;

/// Integrity check kinds this coder can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CheckKind {
    /// No check.
    None = 0x00,
    /// CRC-32.
    Crc32 = 0x01,
    /// CRC-64.
    #[default]
    Crc64 = 0x04,
    /// SHA-256.
    Sha256 = 0x0A,
}

impl CheckKind {
    /// Look up a supported check by its ID.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Crc32),
            0x04 => Some(Self::Crc64),
            0x0A => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Check ID as stored in the stream flags.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Size of the check field in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc32 => 4,
            Self::Crc64 => 8,
            Self::Sha256 => 32,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Crc32 => "CRC32",
            Self::Crc64 => "CRC64",
            Self::Sha256 => "SHA-256",
        }
    }
}

impl TryFrom<u8> for CheckKind {
    type Error = XzError;

    fn try_from(id: u8) -> Result<Self> {
        Self::from_id(id)
            .ok_or_else(|| XzError::options(format!("unsupported integrity check ID {id:#x}")))
    }
}

/// Size of the check field for any check ID, supported or not.
///
/// Returns `None` for IDs that do not fit in four bits.
pub fn check_size(id: u8) -> Option<usize> {
    const SIZES: [usize; CHECK_ID_MAX as usize + 1] =
        [0, 4, 4, 4, 8, 8, 8, 16, 16, 16, 32, 32, 32, 64, 64, 64];
    SIZES.get(id as usize).copied()
}

/// Running check over the uncompressed data of one block.
#[derive(Debug, Clone)]
pub enum Check {
    /// No check.
    None,
    /// CRC-32 state.
    Crc32(Crc32),
    /// CRC-64 state.
    Crc64(Crc64),
    /// SHA-256 state.
    Sha256(Box<Sha256>),
}

impl Check {
    /// Start a new check of the given kind.
    pub fn new(kind: CheckKind) -> Self {
        match kind {
            CheckKind::None => Self::None,
            CheckKind::Crc32 => Self::Crc32(Crc32::new()),
            CheckKind::Crc64 => Self::Crc64(Crc64::new()),
            CheckKind::Sha256 => Self::Sha256(Box::new(Sha256::new())),
        }
    }

    /// The kind of this check.
    pub fn kind(&self) -> CheckKind {
        match self {
            Self::None => CheckKind::None,
            Self::Crc32(_) => CheckKind::Crc32,
            Self::Crc64(_) => CheckKind::Crc64,
            Self::Sha256(_) => CheckKind::Sha256,
        }
    }

    /// Feed uncompressed data.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::None => {}
            Self::Crc32(crc) => crc.update(data),
            Self::Crc64(crc) => crc.update(data),
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finish and return the check field exactly as stored in the stream.
    pub fn finish(self) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Crc32(crc) => crc.finalize().to_le_bytes().to_vec(),
            Self::Crc64(crc) => crc.finalize().to_le_bytes().to_vec(),
            Self::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }

    /// Finish and compare against a stored check field.
    pub fn verify(self, stored: &[u8]) -> Result<()> {
        let name = self.kind().name();
        if self.finish() == stored {
            Ok(())
        } else {
            Err(XzError::CheckMismatch { check: name })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_kind_ids() {
        for kind in [
            CheckKind::None,
            CheckKind::Crc32,
            CheckKind::Crc64,
            CheckKind::Sha256,
        ] {
            assert_eq!(CheckKind::from_id(kind.id()), Some(kind));
            assert_eq!(check_size(kind.id()), Some(kind.size()));
        }
        assert_eq!(CheckKind::from_id(0x02), None);
        assert!(CheckKind::try_from(0x05).is_err());
        assert_eq!(CheckKind::default(), CheckKind::Crc64);
    }

    #[test]
    fn test_reserved_check_sizes() {
        assert_eq!(check_size(0x03), Some(4));
        assert_eq!(check_size(0x07), Some(16));
        assert_eq!(check_size(0x0F), Some(64));
        assert_eq!(check_size(0x10), None);
    }

    #[test]
    fn test_check_fields() {
        let data = b"123456789";
        let mut crc32 = Check::new(CheckKind::Crc32);
        crc32.update(data);
        assert_eq!(crc32.finish(), 0xCBF43926u32.to_le_bytes());

        let mut crc64 = Check::new(CheckKind::Crc64);
        crc64.update(data);
        assert_eq!(crc64.finish(), 0x995DC9BBDF1939FAu64.to_le_bytes());

        let mut sha = Check::new(CheckKind::Sha256);
        sha.update(b"abc");
        let digest = sha.finish();
        assert_eq!(digest.len(), 32);
        assert_eq!(&digest[..4], &[0xBA, 0x78, 0x16, 0xBF]);

        assert!(Check::new(CheckKind::None).finish().is_empty());
    }

    #[test]
    fn test_verify_mismatch() {
        let mut check = Check::new(CheckKind::Crc32);
        check.update(b"payload");
        assert!(matches!(
            check.verify(&[0, 0, 0, 0]),
            Err(XzError::CheckMismatch { check: "CRC32" })
        ));
    }
}
