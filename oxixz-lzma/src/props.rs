//! The LZMA2 filter property byte.
//!
//! LZMA2 stores its dictionary size in one byte `p <= 40`:
//! `(2 | (p & 1)) << (p / 2 + 11)`, with `40` meaning `u32::MAX`.

use oxixz_core::error::{Result, XzError};

/// Largest valid property byte.
pub const PROPS_MAX: u8 = 40;

/// Dictionary size encoded by an LZMA2 property byte.
pub fn dict_size_from_props(props: u8) -> Result<u32> {
    match props {
        PROPS_MAX => Ok(u32::MAX),
        p if p < PROPS_MAX => Ok((2 | u32::from(p & 1)) << (p / 2 + 11)),
        p => Err(XzError::options(format!(
            "LZMA2 dictionary property {p} is out of range"
        ))),
    }
}

/// Smallest property byte whose dictionary is at least `dict_size`.
pub fn props_from_dict_size(dict_size: u32) -> u8 {
    (0..PROPS_MAX)
        .find(|&p| matches!(dict_size_from_props(p), Ok(size) if size >= dict_size))
        .unwrap_or(PROPS_MAX)
}
