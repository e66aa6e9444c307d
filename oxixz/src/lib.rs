//! # OxiXZ
//!
//! Streaming XZ compression and decompression over caller-owned buffers.
//!
//! A [`CoderState`] is initialized once as an encoder or a decoder and then
//! advanced with [`CoderState::run`]: each call takes an input window, an
//! output window and an [`Action`], moves as many bytes as it can and reports
//! a [`Status`] together with the number of bytes consumed and produced.
//!
//! - **Encoding** writes standard XZ streams with one LZMA2 filter and a
//!   CRC32, CRC64, SHA-256 or no integrity check per block. With more than
//!   one thread, blocks are compressed in parallel on a worker pool owned by
//!   the coder state; output order always follows input order.
//! - **Decoding** accepts XZ (optionally concatenated streams with padding)
//!   and, with auto-detection, the legacy `.lzma` format. The memory ceiling
//!   is enforced per block and can be raised after a
//!   [`Status::MemlimitError`].
//!
//! ## Example
//!
//! ```rust
//! use oxixz::{Action, CheckKind, CoderState, Status};
//!
//! let mut state = CoderState::new();
//! assert_eq!(state.init_encoder(6, CheckKind::Crc64, 1), Status::Ok);
//!
//! let mut out = vec![0u8; 4096];
//! let mut stream = Vec::new();
//! let mut input: &[u8] = b"the quick brown fox jumps over the lazy dog";
//! loop {
//!     let result = state.run(Action::Finish, input, &mut out);
//!     input = &input[result.consumed..];
//!     stream.extend_from_slice(&out[..result.produced]);
//!     match result.status {
//!         Status::StreamEnd => break,
//!         Status::Ok => continue,
//!         other => panic!("encoding failed: {other}"),
//!     }
//! }
//! state.teardown();
//!
//! let plain = oxixz::decompress_all(&stream, &oxixz::DecoderConfig::new()).unwrap();
//! assert_eq!(plain, b"the quick brown fox jumps over the lazy dog");
//! ```
//!
//! ## Modules
//!
//! - [`coder`]: the coder state and the boundary operations
//! - [`config`]: encoder and decoder configuration
//! - [`encoder`]: the XZ stream encoder and its worker pool
//! - [`decoder`]: the XZ and `.lzma` decoders
//! - [`xz`]: XZ container framing (headers, index, footer)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod coder;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod xz;

// Re-exports
pub use coder::{CoderState, Mode, RunResult, init_decoder, init_encoder, run, teardown};
pub use config::{DecoderConfig, DecoderFlags, EncoderConfig, MAX_THREADS};
pub use decoder::{Decoder, XzDecoder};
pub use encoder::StreamEncoder;
pub use oxixz_core::{Action, CheckKind, Result, Status, StreamCoder, XzError};
pub use oxixz_lzma::{PRESET_EXTREME, Preset};

/// Output chunk used by the one-shot helpers.
const CHUNK_SIZE: usize = 64 * 1024;

/// Drive `coder` over all of `input` with `Finish` until the stream ends.
fn drive(coder: &mut dyn StreamCoder, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 2 + 64);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut rest = input;
    loop {
        let in_before = coder.total_in();
        let out_before = coder.total_out();
        let status = coder.code(rest, &mut chunk, Action::Finish)?;
        let consumed = (coder.total_in() - in_before) as usize;
        let produced = (coder.total_out() - out_before) as usize;
        rest = &rest[consumed..];
        out.extend_from_slice(&chunk[..produced]);

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok
                if consumed == 0 && produced == 0 && coder.is_blocked(rest.is_empty(), false) =>
            {
                return Err(XzError::corrupted(coder.total_in(), "unexpected end of input"));
            }
            _ => {}
        }
    }
}

/// Compress `data` into one XZ stream.
///
/// # Example
///
/// ```
/// use oxixz::{DecoderConfig, EncoderConfig, Preset, compress_all, decompress_all};
///
/// let data = b"abcabcabcabcabcabc".repeat(100);
/// let xz = compress_all(&data, &EncoderConfig::new(Preset::FAST)).unwrap();
/// assert!(xz.len() < data.len());
/// assert_eq!(decompress_all(&xz, &DecoderConfig::new()).unwrap(), data);
/// ```
pub fn compress_all(data: &[u8], config: &EncoderConfig) -> Result<Vec<u8>> {
    let mut encoder = StreamEncoder::new(config)?;
    drive(&mut encoder, data)
}

/// Decompress a complete XZ (or, with auto-detection, `.lzma`) input.
pub fn decompress_all(data: &[u8], config: &DecoderConfig) -> Result<Vec<u8>> {
    let mut decoder = Decoder::new(config);
    drive(&mut decoder, data)
}
