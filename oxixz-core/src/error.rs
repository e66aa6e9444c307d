//! Error types for OxiXZ operations.
//!
//! Every failure inside the coder is an [`XzError`]. The coder boundary
//! collapses it into the closed [`Status`] vocabulary with
//! [`XzError::status`], keeping the descriptive error around for callers
//! that want to log it.

use crate::status::Status;
use thiserror::Error;

/// The main error type for OxiXZ operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum XzError {
    /// Memory allocation failed.
    #[error("Memory allocation failed: {message}")]
    Mem {
        /// What was being allocated.
        message: String,
    },

    /// The memory ceiling is lower than what the stream needs.
    #[error("Memory usage limit exceeded: need {needed} bytes, limit is {limit}")]
    MemLimit {
        /// Bytes the decoder needs.
        needed: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// Invalid magic bytes at the start of a stream.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// The input is not in a recognised format.
    #[error("Unrecognised format: {message}")]
    Format {
        /// Description of the problem.
        message: String,
    },

    /// Invalid or unsupported options.
    #[error("Invalid options: {message}")]
    Options {
        /// Description of the problem.
        message: String,
    },

    /// A block uses a filter this coder does not implement.
    #[error("Unsupported filter ID: {id:#x}")]
    UnsupportedFilter {
        /// The filter ID found in the block header.
        id: u64,
    },

    /// Corrupted stream data.
    #[error("Corrupted data at offset {offset}: {message}")]
    Data {
        /// Byte offset (in the compressed input) where corruption was found.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A CRC-32 protecting a header field did not match.
    #[error("CRC mismatch in {field}: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// The protected structure.
        field: &'static str,
        /// Stored CRC.
        expected: u32,
        /// Computed CRC.
        computed: u32,
    },

    /// A block integrity check did not match its data.
    #[error("{check} integrity check failed")]
    CheckMismatch {
        /// Name of the check.
        check: &'static str,
    },

    /// The index disagrees with the decoded blocks.
    #[error("Index mismatch: {message}")]
    IndexMismatch {
        /// Description of the disagreement.
        message: String,
    },

    /// The coder was driven out of its valid call sequence.
    #[error("Programming error: {message}")]
    Program {
        /// Description of the misuse.
        message: String,
    },
}

/// Result type alias for OxiXZ operations.
pub type Result<T> = std::result::Result<T, XzError>;

impl XzError {
    /// Create a memory allocation error.
    pub fn mem(message: impl Into<String>) -> Self {
        Self::Mem {
            message: message.into(),
        }
    }

    /// Create a memory limit error.
    pub fn mem_limit(needed: u64, limit: u64) -> Self {
        Self::MemLimit { needed, limit }
    }

    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an options error.
    pub fn options(message: impl Into<String>) -> Self {
        Self::Options {
            message: message.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Data {
            offset,
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(field: &'static str, expected: u32, computed: u32) -> Self {
        Self::CrcMismatch {
            field,
            expected,
            computed,
        }
    }

    /// Create an index mismatch error.
    pub fn index_mismatch(message: impl Into<String>) -> Self {
        Self::IndexMismatch {
            message: message.into(),
        }
    }

    /// Create a programming error.
    pub fn program(message: impl Into<String>) -> Self {
        Self::Program {
            message: message.into(),
        }
    }

    /// The status code reported for this error at the coder boundary.
    pub fn status(&self) -> Status {
        match self {
            Self::Mem { .. } => Status::MemError,
            Self::MemLimit { .. } => Status::MemlimitError,
            Self::InvalidMagic { .. } | Self::Format { .. } => Status::FormatError,
            Self::Options { .. } | Self::UnsupportedFilter { .. } => Status::OptionsError,
            Self::Data { .. }
            | Self::CrcMismatch { .. }
            | Self::CheckMismatch { .. }
            | Self::IndexMismatch { .. } => Status::DataError,
            Self::Program { .. } => Status::ProgError,
        }
    }
}

impl From<XzError> for Status {
    fn from(err: XzError) -> Self {
        err.status()
    }
}
