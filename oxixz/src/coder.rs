//! The coder state and its boundary operations.
//!
//! [`CoderState`] is what a caller owns: it starts uninitialized, is set up
//! by exactly one initializer, is advanced by [`CoderState::run`] and is
//! released by [`CoderState::teardown`] (or by dropping it). Internally it
//! holds the pipeline as an opaque [`StreamCoder`]; failures are folded into
//! the closed [`Status`] vocabulary here and nowhere else.

use crate::config::{DecoderConfig, EncoderConfig};
use crate::decoder::Decoder;
use crate::encoder::StreamEncoder;
use oxixz_core::check::CheckKind;
use oxixz_core::error::{Result, XzError};
use oxixz_core::status::{Action, Status};
use oxixz_core::traits::StreamCoder;

/// What the coder state was initialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No initializer has succeeded yet.
    Uninitialized,
    /// Decompressing.
    Decoding,
    /// Compressing.
    Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Ended,
    Failed,
}

/// Outcome of one [`CoderState::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    /// Status of the call.
    pub status: Status,
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes produced.
    pub produced: usize,
}

/// A streaming XZ encoder or decoder owned by one caller.
///
/// # Example
///
/// ```
/// use oxixz::{Action, CheckKind, CoderState, Status};
///
/// let mut encoder = CoderState::new();
/// assert_eq!(encoder.init_encoder(6, CheckKind::Crc64, 1), Status::Ok);
/// let mut compressed = [0u8; 1024];
/// let run = encoder.run(Action::Finish, b"hello world", &mut compressed);
/// assert_eq!(run.status, Status::StreamEnd);
/// assert_eq!(run.consumed, 11);
/// encoder.teardown();
///
/// let mut decoder = CoderState::new();
/// assert_eq!(decoder.init_decoder(u64::MAX, false, 0), Status::Ok);
/// let mut plain = [0u8; 64];
/// let out = decoder.run(Action::Finish, &compressed[..run.produced], &mut plain);
/// assert_eq!(out.status, Status::StreamEnd);
/// assert_eq!(&plain[..out.produced], b"hello world");
/// ```
pub struct CoderState {
    engine: Option<Box<dyn StreamCoder>>,
    mode: Mode,
    phase: Phase,
    last_error: Option<XzError>,
}

impl CoderState {
    /// Create an uninitialized coder state.
    pub fn new() -> Self {
        Self {
            engine: None,
            mode: Mode::Uninitialized,
            phase: Phase::Active,
            last_error: None,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The error behind the most recent error status, if any.
    pub fn last_error(&self) -> Option<&XzError> {
        self.last_error.as_ref()
    }

    /// Set up decompression from raw parameters.
    ///
    /// `flags` is a [`DecoderFlags`](crate::DecoderFlags) bit set; unknown
    /// bits give [`Status::OptionsError`].
    pub fn init_decoder(&mut self, memlimit: u64, auto_detect: bool, flags: u32) -> Status {
        match DecoderConfig::from_raw(memlimit, auto_detect, flags) {
            Ok(config) => self.init_decoder_with(&config),
            Err(err) => self.init_failed(err),
        }
    }

    /// Set up decompression.
    pub fn init_decoder_with(&mut self, config: &DecoderConfig) -> Status {
        if let Err(err) = self.ensure_uninitialized() {
            return self.init_failed(err);
        }
        self.install(Mode::Decoding, Box::new(Decoder::new(config)))
    }

    /// Set up compression from raw parameters.
    ///
    /// `preset` is a level 0-9, optionally or'ed with
    /// [`PRESET_EXTREME`](oxixz_lzma::PRESET_EXTREME).
    pub fn init_encoder(&mut self, preset: u32, check: CheckKind, threads: u32) -> Status {
        match EncoderConfig::from_raw(preset, check, threads) {
            Ok(config) => self.init_encoder_with(&config),
            Err(err) => self.init_failed(err),
        }
    }

    /// Set up compression. One or zero threads encode on the caller's
    /// thread; more start a worker pool owned by this state.
    pub fn init_encoder_with(&mut self, config: &EncoderConfig) -> Status {
        if let Err(err) = self.ensure_uninitialized() {
            return self.init_failed(err);
        }
        match StreamEncoder::new(config) {
            Ok(encoder) => self.install(Mode::Encoding, Box::new(encoder)),
            Err(err) => self.init_failed(err),
        }
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        if self.mode == Mode::Uninitialized {
            Ok(())
        } else {
            Err(XzError::program("coder state is already initialized"))
        }
    }

    fn install(&mut self, mode: Mode, engine: Box<dyn StreamCoder>) -> Status {
        self.engine = Some(engine);
        self.mode = mode;
        self.phase = Phase::Active;
        self.last_error = None;
        Status::Ok
    }

    fn init_failed(&mut self, err: XzError) -> Status {
        let status = err.status();
        tracing::warn!(%status, error = %err, "coder initialization failed");
        self.last_error = Some(err);
        status
    }

    /// Advance the stream.
    ///
    /// The whole output window is cleared first. Consumes from `input` and
    /// writes to `output` until no more progress is possible, the requested
    /// flush completes or the stream ends.
    pub fn run(&mut self, action: Action, input: &[u8], output: &mut [u8]) -> RunResult {
        output.fill(0);

        match self.phase {
            Phase::Active => {}
            Phase::Ended => return self.refuse("stream has already ended"),
            Phase::Failed => return self.refuse("coder state has failed"),
        }
        let Some(engine) = self.engine.as_mut() else {
            return self.refuse("coder state is not initialized");
        };

        let in_before = engine.total_in();
        let out_before = engine.total_out();
        let result = engine.code(input, output, action);
        let consumed = (engine.total_in() - in_before) as usize;
        let produced = (engine.total_out() - out_before) as usize;

        let status = match result {
            Ok(Status::Ok)
                if consumed == 0
                    && produced == 0
                    && engine.is_blocked(input.is_empty(), output.is_empty()) =>
            {
                Status::BufError
            }
            Ok(status) => {
                if status == Status::StreamEnd
                    && (self.mode == Mode::Decoding || action == Action::Finish)
                {
                    self.phase = Phase::Ended;
                    tracing::debug!(
                        total_in = engine.total_in(),
                        total_out = engine.total_out(),
                        "stream ended"
                    );
                }
                status
            }
            Err(err) => {
                let status = err.status();
                if !status.is_recoverable() {
                    self.phase = Phase::Failed;
                }
                tracing::warn!(%status, ?action, error = %err, "run step failed");
                self.last_error = Some(err);
                status
            }
        };

        tracing::trace!(%status, ?action, consumed, produced, "run step");
        RunResult {
            status,
            consumed,
            produced,
        }
    }

    fn refuse(&mut self, message: &str) -> RunResult {
        let err = XzError::program(message);
        tracing::warn!(error = %err, "run step refused");
        self.last_error = Some(err);
        RunResult {
            status: Status::ProgError,
            consumed: 0,
            produced: 0,
        }
    }

    /// Release the pipeline, joining any worker threads. Dropping the state
    /// does the same.
    pub fn teardown(self) {
        tracing::debug!(mode = ?self.mode, "coder state released");
        drop(self);
    }

    /// Memory used, or needed by the block that hit the memory ceiling.
    pub fn memusage(&self) -> u64 {
        self.engine.as_ref().map_or(0, |e| e.memusage())
    }

    /// Memory ceiling of a decoder; 0 for encoders.
    pub fn memlimit(&self) -> u64 {
        self.engine.as_ref().map_or(0, |e| e.memlimit())
    }

    /// Raise or lower the decoder's memory ceiling. After a
    /// [`Status::MemlimitError`] the next [`CoderState::run`] resumes where
    /// decoding stopped.
    pub fn set_memlimit(&mut self, limit: u64) -> Status {
        let result = match self.engine.as_mut() {
            Some(engine) => engine.set_memlimit(limit),
            None => Err(XzError::program("coder state is not initialized")),
        };
        match result {
            Ok(()) => Status::Ok,
            Err(err) => {
                let status = err.status();
                self.last_error = Some(err);
                status
            }
        }
    }

    /// Total input consumed.
    pub fn total_in(&self) -> u64 {
        self.engine.as_ref().map_or(0, |e| e.total_in())
    }

    /// Total output produced.
    pub fn total_out(&self) -> u64 {
        self.engine.as_ref().map_or(0, |e| e.total_out())
    }

    /// Check kind of the stream: configured when encoding, read from the
    /// stream header when decoding.
    pub fn check(&self) -> Option<CheckKind> {
        self.engine.as_ref().and_then(|e| e.check())
    }
}

impl Default for CoderState {
    fn default() -> Self {
        Self::new()
    }
}

/// Set up `state` for decompression.
pub fn init_decoder(state: &mut CoderState, memlimit: u64, auto_detect: bool, flags: u32) -> Status {
    state.init_decoder(memlimit, auto_detect, flags)
}

/// Set up `state` for compression.
pub fn init_encoder(state: &mut CoderState, preset: u32, check: CheckKind, threads: u32) -> Status {
    state.init_encoder(preset, check, threads)
}

/// Advance `state`; returns the status and the bytes consumed and produced.
pub fn run(
    state: &mut CoderState,
    action: Action,
    input: &[u8],
    output: &mut [u8],
) -> (Status, usize, usize) {
    let result = state.run(action, input, output);
    (result.status, result.consumed, result.produced)
}

/// Release `state`.
pub fn teardown(state: CoderState) {
    state.teardown();
}
