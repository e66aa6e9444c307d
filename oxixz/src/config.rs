//! Encoder and decoder configuration.

use bitflags::bitflags;
use oxixz_core::check::CheckKind;
use oxixz_core::error::{Result, XzError};
use oxixz_core::vli::VLI_MAX;
use oxixz_lzma::Preset;

/// Largest worker thread count accepted by the encoder.
pub const MAX_THREADS: u32 = 16384;

/// Lower bound of the default block size.
pub const BLOCK_SIZE_MIN_DEFAULT: u64 = 1 << 20;

bitflags! {
    /// Decoder flags, bit-compatible with liblzma's decoder flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DecoderFlags: u32 {
        /// Report [`Status::NoCheck`](oxixz_core::Status::NoCheck) for
        /// streams without an integrity check.
        const TELL_NO_CHECK = 0x01;
        /// Report [`Status::UnsupportedCheck`](oxixz_core::Status::UnsupportedCheck)
        /// for checks that cannot be verified.
        const TELL_UNSUPPORTED_CHECK = 0x02;
        /// Report [`Status::GetCheck`](oxixz_core::Status::GetCheck) once
        /// the check kind is known.
        const TELL_ANY_CHECK = 0x04;
        /// Keep decoding concatenated streams until the caller finishes.
        ///
        /// A `.lzma` stream cannot be concatenated, but it too ends only on
        /// [`Action::Finish`](oxixz_core::Action::Finish), and input after
        /// its end marker is a data error.
        const CONCATENATED = 0x08;
        /// Do not verify block checks.
        const IGNORE_CHECK = 0x10;
    }
}

impl DecoderFlags {
    /// Decode a raw flags word, rejecting unknown bits.
    pub fn from_raw(raw: u32) -> Result<Self> {
        Self::from_bits(raw)
            .ok_or_else(|| XzError::options(format!("unsupported decoder flags {raw:#x}")))
    }
}

/// Configuration for the XZ encoder.
///
/// # Example
///
/// ```
/// use oxixz::EncoderConfig;
/// use oxixz_core::CheckKind;
/// use oxixz_lzma::Preset;
///
/// let config = EncoderConfig::new(Preset::DEFAULT)
///     .with_check(CheckKind::Sha256)
///     .with_threads(4);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.block_size(), 24 << 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Compression preset.
    pub preset: Preset,
    /// Integrity check stored after each block.
    pub check: CheckKind,
    /// Worker threads; 0 or 1 encodes on the caller's thread.
    pub threads: u32,
    /// Uncompressed bytes per block; `None` picks a size from the preset.
    pub block_size: Option<u64>,
}

impl EncoderConfig {
    /// Single-threaded configuration with the default CRC64 check.
    pub fn new(preset: Preset) -> Self {
        Self {
            preset,
            check: CheckKind::default(),
            threads: 1,
            block_size: None,
        }
    }

    /// Build from the raw preset word.
    pub fn from_raw(preset: u32, check: CheckKind, threads: u32) -> Result<Self> {
        let config = Self::new(Preset::from_raw(preset)?)
            .with_check(check)
            .with_threads(threads);
        config.validate()?;
        Ok(config)
    }

    /// Set the integrity check.
    #[must_use]
    pub fn with_check(mut self, check: CheckKind) -> Self {
        self.check = check;
        self
    }

    /// Set the worker thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    /// Set an explicit block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Check the thread count and block size.
    pub fn validate(&self) -> Result<()> {
        if self.threads > MAX_THREADS {
            return Err(XzError::options(format!(
                "{} threads requested, at most {MAX_THREADS} supported",
                self.threads
            )));
        }
        if let Some(size) = self.block_size {
            if size == 0 || size > VLI_MAX {
                return Err(XzError::options(format!("invalid block size {size}")));
            }
        }
        Ok(())
    }

    /// Whether blocks are compressed on a worker pool.
    pub fn is_multithreaded(&self) -> bool {
        self.threads > 1
    }

    /// Uncompressed bytes per block.
    ///
    /// Defaults to three dictionaries, and never less than 1 MiB.
    pub fn block_size(&self) -> u64 {
        self.block_size
            .unwrap_or_else(|| (3 * u64::from(self.preset.dict_size())).max(BLOCK_SIZE_MIN_DEFAULT))
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new(Preset::DEFAULT)
    }
}

/// Configuration for the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Memory ceiling in bytes.
    pub memlimit: u64,
    /// Accept the legacy `.lzma` format as well as XZ.
    pub auto_detect: bool,
    /// Decoder flags.
    pub flags: DecoderFlags,
}

impl DecoderConfig {
    /// XZ-only decoder without a memory ceiling.
    pub fn new() -> Self {
        Self {
            memlimit: u64::MAX,
            auto_detect: false,
            flags: DecoderFlags::empty(),
        }
    }

    /// Build from the raw flags word.
    pub fn from_raw(memlimit: u64, auto_detect: bool, flags: u32) -> Result<Self> {
        Ok(Self::new()
            .with_memlimit(memlimit)
            .with_auto_detect(auto_detect)
            .with_flags(DecoderFlags::from_raw(flags)?))
    }

    /// Set the memory ceiling. Zero is treated as one byte.
    #[must_use]
    pub fn with_memlimit(mut self, memlimit: u64) -> Self {
        self.memlimit = memlimit.max(1);
        self
    }

    /// Enable or disable `.lzma` detection.
    #[must_use]
    pub fn with_auto_detect(mut self, auto_detect: bool) -> Self {
        self.auto_detect = auto_detect;
        self
    }

    /// Set the decoder flags.
    #[must_use]
    pub fn with_flags(mut self, flags: DecoderFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::new()
    }
}
