//! # OxiXZ LZMA
//!
//! The LZMA2 engine used by the OxiXZ container.
//!
//! The bit-level coder is `liblzma`; this crate owns the pieces the
//! container needs around it:
//!
//! - [`Preset`]: compression levels `0..=9` with the "extreme" modifier
//! - [`props`]: the one-byte LZMA2 dictionary property
//! - [`Lzma2Encoder`] / [`Lzma2Decoder`]: raw streaming LZMA2, fed through
//!   caller buffers and reporting [`Progress`]
//! - [`AloneDecoder`]: the legacy `.lzma` format
//!
//! ## Example
//!
//! ```rust
//! use oxixz_core::Action;
//! use oxixz_lzma::{Lzma2Decoder, Lzma2Encoder, Preset};
//!
//! let mut encoder = Lzma2Encoder::new(Preset::FAST)?;
//! let mut compressed = vec![0u8; 256];
//! let p = encoder.process(b"Hello, LZMA2!", &mut compressed, Action::Finish)?;
//! assert!(p.finished);
//!
//! let mut decoder = Lzma2Decoder::new(encoder.props())?;
//! let mut plain = vec![0u8; 64];
//! let q = decoder.process(&compressed[..p.produced], &mut plain)?;
//! assert_eq!(&plain[..q.produced], b"Hello, LZMA2!");
//! # Ok::<(), oxixz_core::XzError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod preset;
pub mod props;

// Re-exports
pub use engine::{AloneDecoder, Lzma2Decoder, Lzma2Encoder, Progress, lzma2_decoder_memusage};
pub use preset::{PRESET_EXTREME, PRESET_LEVEL_MAX, Preset};
pub use props::{dict_size_from_props, props_from_dict_size};
