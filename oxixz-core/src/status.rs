//! Status and action vocabularies shared by every coder.
//!
//! A coder call always reports one [`Status`], and every Run Step is steered
//! by one [`Action`]. Both sets are closed; matching on them is exhaustive.

use std::fmt;

/// Outcome of an initializer or a Run Step call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Progress was made; call again to continue.
    Ok,
    /// The stream (or the requested flush) is complete.
    StreamEnd,
    /// The stream being decoded has no integrity check.
    NoCheck,
    /// The stream uses a check this coder cannot verify.
    UnsupportedCheck,
    /// The check kind of the stream is now known.
    GetCheck,
    /// An allocation failed.
    MemError,
    /// The configured memory ceiling would be exceeded.
    MemlimitError,
    /// The input is not a stream of the configured kind.
    FormatError,
    /// The configuration is invalid or unsupported.
    OptionsError,
    /// The stream is corrupt or its integrity check failed.
    DataError,
    /// No progress was possible with the supplied windows.
    BufError,
    /// The coder was used out of its valid call sequence.
    ProgError,
}

impl Status {
    /// All status codes, in declaration order.
    pub const ALL: [Status; 12] = [
        Status::Ok,
        Status::StreamEnd,
        Status::NoCheck,
        Status::UnsupportedCheck,
        Status::GetCheck,
        Status::MemError,
        Status::MemlimitError,
        Status::FormatError,
        Status::OptionsError,
        Status::DataError,
        Status::BufError,
        Status::ProgError,
    ];

    /// Whether this status reports a failure.
    ///
    /// `BufError` counts as an error even though the caller can recover
    /// from it by supplying more input or output space.
    pub fn is_error(self) -> bool {
        !matches!(
            self,
            Status::Ok
                | Status::StreamEnd
                | Status::NoCheck
                | Status::UnsupportedCheck
                | Status::GetCheck
        )
    }

    /// Whether the coder stays usable after returning this status.
    pub fn is_recoverable(self) -> bool {
        !self.is_error() || matches!(self, Status::BufError | Status::MemlimitError)
    }

    /// liblzma-compatible numeric code (`lzma_ret`).
    pub fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::StreamEnd => 1,
            Status::NoCheck => 2,
            Status::UnsupportedCheck => 3,
            Status::GetCheck => 4,
            Status::MemError => 5,
            Status::MemlimitError => 6,
            Status::FormatError => 7,
            Status::OptionsError => 8,
            Status::DataError => 9,
            Status::BufError => 10,
            Status::ProgError => 11,
        }
    }

    /// Inverse of [`Status::code`].
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::StreamEnd => "STREAM_END",
            Status::NoCheck => "NO_CHECK",
            Status::UnsupportedCheck => "UNSUPPORTED_CHECK",
            Status::GetCheck => "GET_CHECK",
            Status::MemError => "MEM_ERROR",
            Status::MemlimitError => "MEMLIMIT_ERROR",
            Status::FormatError => "FORMAT_ERROR",
            Status::OptionsError => "OPTIONS_ERROR",
            Status::DataError => "DATA_ERROR",
            Status::BufError => "BUF_ERROR",
            Status::ProgError => "PROG_ERROR",
        };
        f.write_str(name)
    }
}

/// Caller directive for a Run Step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    /// Plain incremental processing, output may stay buffered.
    #[default]
    Run,
    /// Emit everything buffered so far, keeping the dictionary.
    SyncFlush,
    /// Emit everything buffered so far and start a fresh dictionary.
    FullFlush,
    /// Close the current block without waiting for its output.
    FullBarrier,
    /// Emit everything and terminate the stream.
    Finish,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 5] = [
        Action::Run,
        Action::SyncFlush,
        Action::FullFlush,
        Action::FullBarrier,
        Action::Finish,
    ];

    /// liblzma-compatible numeric code (`lzma_action`).
    pub fn code(self) -> u32 {
        match self {
            Action::Run => 0,
            Action::SyncFlush => 1,
            Action::FullFlush => 2,
            Action::Finish => 3,
            Action::FullBarrier => 4,
        }
    }

    /// Inverse of [`Action::code`].
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.code() == code)
    }

    /// Whether the action asks for a flush boundary or stream end.
    pub fn is_flush(self) -> bool {
        !matches!(self, Action::Run)
    }
}
