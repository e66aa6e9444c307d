//! # OxiXZ Core
//!
//! Core components shared by the OxiXZ crates.
//!
//! - [`status`]: the closed [`Status`] and [`Action`] vocabularies
//! - [`error`]: [`XzError`] and its mapping onto [`Status`]
//! - [`crc`]: CRC-32 and CRC-64
//! - [`check`]: block integrity checks (None, CRC32, CRC64, SHA-256)
//! - [`vli`]: XZ variable-length integers
//! - [`traits`]: the [`StreamCoder`] interface every pipeline implements
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Container (oxixz)                                       │
//! │     Coder State, Run Step, XZ framing, worker pool      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Engine (oxixz-lzma)                                     │
//! │     presets, raw LZMA2 encoder/decoder, .lzma decoder   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Primitives (this crate)                                 │
//! │     Status/Action, XzError, CRC, checks, VLI            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxixz_core::check::{Check, CheckKind};
//! use oxixz_core::crc::Crc32;
//!
//! assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
//!
//! let mut check = Check::new(CheckKind::Crc64);
//! check.update(b"123456789");
//! assert_eq!(check.finish().len(), 8);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod check;
pub mod crc;
pub mod error;
pub mod status;
pub mod traits;
pub mod vli;

// Re-exports for convenience
pub use check::{Check, CheckKind};
pub use crc::{Crc32, Crc64};
pub use error::{Result, XzError};
pub use status::{Action, Status};
pub use traits::StreamCoder;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::check::{Check, CheckKind};
    pub use crate::error::{Result, XzError};
    pub use crate::status::{Action, Status};
    pub use crate::traits::StreamCoder;
}
