//! One XZ block being compressed.

use crate::xz::{BlockHeader, IndexRecord, padding_len};
use oxixz_core::check::{Check, CheckKind};
use oxixz_core::error::{Result, XzError};
use oxixz_core::status::Action;
use oxixz_lzma::{Lzma2Encoder, Preset};

/// Engine output buffer per call.
const SCRATCH_SIZE: usize = 64 * 1024;

/// Message from the coordinator to a block.
#[derive(Debug)]
pub(crate) enum BlockInput {
    /// More uncompressed data.
    Data(Vec<u8>),
    /// Make everything fed so far decodable, keeping the dictionary.
    SyncFlush,
    /// No more data; close the block.
    Finish,
}

/// Message from a block back to the coordinator, in production order.
#[derive(Debug)]
pub(crate) enum BlockOutput {
    /// Compressed bytes, header included.
    Bytes(Vec<u8>),
    /// Every byte up to the last sync flush has been sent.
    Flushed,
    /// The block is complete.
    Done(IndexRecord),
    /// The block failed; no more output follows.
    Failed(XzError),
}

/// Compresses one block: header, LZMA2 data, padding and check.
pub(crate) struct BlockTask {
    seq: u64,
    engine: Lzma2Encoder,
    check: Check,
    header_size: u64,
    uncompressed: u64,
    scratch: Vec<u8>,
}

impl BlockTask {
    pub(crate) fn new(seq: u64, preset: Preset, check: CheckKind) -> Result<Self> {
        Ok(Self {
            seq,
            engine: Lzma2Encoder::new(preset)?,
            check: Check::new(check),
            header_size: 0,
            uncompressed: 0,
            scratch: vec![0u8; SCRATCH_SIZE],
        })
    }

    /// Emit the block header.
    pub(crate) fn start(&mut self, emit: &mut dyn FnMut(BlockOutput)) {
        let header = BlockHeader::new(self.engine.props()).encode();
        self.header_size = header.len() as u64;
        emit(BlockOutput::Bytes(header));
    }

    /// Handle one message. Returns `true` once the block is complete.
    pub(crate) fn handle(
        &mut self,
        input: BlockInput,
        emit: &mut dyn FnMut(BlockOutput),
    ) -> Result<bool> {
        match input {
            BlockInput::Data(data) => {
                self.check.update(&data);
                self.uncompressed += data.len() as u64;
                let bytes = self.pump(&data, Action::Run)?;
                if !bytes.is_empty() {
                    emit(BlockOutput::Bytes(bytes));
                }
                Ok(false)
            }
            BlockInput::SyncFlush => {
                let bytes = self.pump(&[], Action::SyncFlush)?;
                if !bytes.is_empty() {
                    emit(BlockOutput::Bytes(bytes));
                }
                emit(BlockOutput::Flushed);
                Ok(false)
            }
            BlockInput::Finish => {
                let mut tail = self.pump(&[], Action::Finish)?;
                let compressed = self.engine.total_out();
                tail.resize(tail.len() + padding_len(compressed), 0x00);

                let check = std::mem::replace(&mut self.check, Check::None);
                let check_field = check.finish();
                tail.extend_from_slice(&check_field);

                let record = IndexRecord {
                    unpadded_size: self.header_size + compressed + check_field.len() as u64,
                    uncompressed_size: self.uncompressed,
                };
                tracing::debug!(
                    seq = self.seq,
                    uncompressed = record.uncompressed_size,
                    unpadded = record.unpadded_size,
                    "block complete"
                );
                emit(BlockOutput::Bytes(tail));
                emit(BlockOutput::Done(record));
                Ok(true)
            }
        }
    }

    /// Drive the engine until `input` is consumed (`Run`) or the flush
    /// completes, collecting its output.
    fn pump(&mut self, mut input: &[u8], action: Action) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let progress = self.engine.process(input, &mut self.scratch, action)?;
            input = &input[progress.consumed..];
            out.extend_from_slice(&self.scratch[..progress.produced]);

            let done = match action {
                Action::Run => input.is_empty() && progress.produced < self.scratch.len(),
                _ => progress.finished,
            };
            if done {
                return Ok(out);
            }
            if progress.is_idle() {
                return Err(XzError::program(format!(
                    "LZMA2 encoder stalled in block {}",
                    self.seq
                )));
            }
        }
    }
}
