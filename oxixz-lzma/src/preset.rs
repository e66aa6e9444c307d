//! Compression presets.
//!
//! A preset is a level `0..=9` plus an optional "extreme" modifier that
//! spends more CPU time for a slightly better ratio. On the wire it is a
//! single `u32`: the level in the low bits, [`PRESET_EXTREME`] as a flag.

use oxixz_core::error::{Result, XzError};
use std::fmt;

/// Flag bit selecting the slower "extreme" variant of a level.
pub const PRESET_EXTREME: u32 = 0x8000_0000;

/// Bits of the preset word that hold the level.
pub const PRESET_LEVEL_MASK: u32 = 0x1F;

/// Highest preset level.
pub const PRESET_LEVEL_MAX: u8 = 9;

/// Dictionary size of each level, in bytes.
const DICT_SIZES: [u32; 10] = [
    1 << 18, // 256 KiB
    1 << 20, // 1 MiB
    1 << 21, // 2 MiB
    1 << 22, // 4 MiB
    1 << 22, // 4 MiB
    1 << 23, // 8 MiB
    1 << 23, // 8 MiB
    1 << 24, // 16 MiB
    1 << 25, // 32 MiB
    1 << 26, // 64 MiB
];

/// A validated compression preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Preset {
    level: u8,
    extreme: bool,
}

impl Preset {
    /// Fastest preset (level 0).
    pub const FAST: Self = Self {
        level: 0,
        extreme: false,
    };
    /// Default preset (level 6).
    pub const DEFAULT: Self = Self {
        level: 6,
        extreme: false,
    };
    /// Best plain preset (level 9).
    pub const BEST: Self = Self {
        level: 9,
        extreme: false,
    };

    /// Create a preset from a level, rejecting levels above 9.
    pub fn new(level: u8) -> Result<Self> {
        if level > PRESET_LEVEL_MAX {
            return Err(XzError::options(format!(
                "preset level {level} is out of range 0..=9"
            )));
        }
        Ok(Self {
            level,
            extreme: false,
        })
    }

    /// Same level with the extreme modifier set or cleared.
    #[must_use]
    pub fn with_extreme(mut self, extreme: bool) -> Self {
        self.extreme = extreme;
        self
    }

    /// Decode a raw preset word.
    ///
    /// Any bit outside the level and [`PRESET_EXTREME`] is an error.
    pub fn from_raw(raw: u32) -> Result<Self> {
        if raw & !(PRESET_LEVEL_MASK | PRESET_EXTREME) != 0 {
            return Err(XzError::options(format!(
                "unsupported preset flags {raw:#x}"
            )));
        }
        let level = (raw & PRESET_LEVEL_MASK) as u8;
        Ok(Self::new(level)?.with_extreme(raw & PRESET_EXTREME != 0))
    }

    /// The raw preset word.
    pub fn to_raw(self) -> u32 {
        let extreme = if self.extreme { PRESET_EXTREME } else { 0 };
        u32::from(self.level) | extreme
    }

    /// The level, `0..=9`.
    pub fn level(self) -> u8 {
        self.level
    }

    /// Whether the extreme modifier is set.
    pub fn is_extreme(self) -> bool {
        self.extreme
    }

    /// Dictionary size this preset compresses with.
    pub fn dict_size(self) -> u32 {
        DICT_SIZES[usize::from(self.level)]
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for Preset {
    type Error = XzError;

    fn try_from(raw: u32) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level)?;
        if self.extreme {
            f.write_str("e")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(Preset::FAST.level(), 0);
        assert_eq!(Preset::DEFAULT.level(), 6);
        assert_eq!(Preset::BEST.level(), 9);
        assert_eq!(Preset::default(), Preset::DEFAULT);
        assert!(Preset::new(10).is_err());
    }

    #[test]
    fn test_raw_word() {
        let preset = Preset::from_raw(6 | PRESET_EXTREME).unwrap();
        assert_eq!(preset.level(), 6);
        assert!(preset.is_extreme());
        assert_eq!(preset.to_raw(), 6 | PRESET_EXTREME);
        assert_eq!(preset.to_string(), "6e");

        assert!(Preset::from_raw(10).is_err());
        assert!(Preset::from_raw(0x100).is_err());
        assert!(Preset::from_raw(0x4000_0000).is_err());
    }

    #[test]
    fn test_dict_sizes() {
        assert_eq!(Preset::FAST.dict_size(), 256 * 1024);
        assert_eq!(Preset::DEFAULT.dict_size(), 8 * 1024 * 1024);
        assert_eq!(Preset::BEST.dict_size(), 64 * 1024 * 1024);
        // The modifier does not change the dictionary.
        assert_eq!(
            Preset::DEFAULT.with_extreme(true).dict_size(),
            Preset::DEFAULT.dict_size()
        );
    }
}
