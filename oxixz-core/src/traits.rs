//! The streaming coder interface.
//!
//! Every pipeline behind a coder state (XZ decoder, legacy `.lzma` decoder,
//! block encoder) implements [`StreamCoder`]. The caller-facing layer only
//! talks to this trait, so the concrete pipeline stays an owned, opaque
//! resource.

use crate::check::CheckKind;
use crate::error::{Result, XzError};
use crate::status::{Action, Status};

/// An incremental compressor or decompressor driven through caller buffers.
///
/// Implementations keep running byte counters; the caller derives how much a
/// call consumed and produced from the counters, which stay accurate even
/// when [`StreamCoder::code`] fails part way through.
pub trait StreamCoder: Send {
    /// Consume from `input` and produce into `output`.
    ///
    /// Returns a non-error status: [`Status::Ok`] to keep going,
    /// [`Status::StreamEnd`] when the stream or the requested flush is done,
    /// or one of the informational check statuses.
    fn code(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Status>;

    /// Total bytes consumed so far.
    fn total_in(&self) -> u64;

    /// Total bytes produced so far.
    fn total_out(&self) -> u64;

    /// Whether a call that moved nothing was stuck on the caller's windows.
    ///
    /// Only consulted after a call that consumed and produced nothing and
    /// returned [`Status::Ok`].
    fn is_blocked(&self, input_empty: bool, output_empty: bool) -> bool;

    /// Integrity check of the stream, once known.
    fn check(&self) -> Option<CheckKind>;

    /// Memory the coder uses or needs, in bytes.
    fn memusage(&self) -> u64 {
        0
    }

    /// Memory ceiling, if the coder enforces one.
    fn memlimit(&self) -> u64 {
        0
    }

    /// Change the memory ceiling.
    fn set_memlimit(&mut self, _limit: u64) -> Result<()> {
        Err(XzError::program("this coder has no memory limit"))
    }
}
