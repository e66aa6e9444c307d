//! XZ stream encoder.
//!
//! Input is cut into blocks of a fixed uncompressed size. Each block is a
//! [`BlockTask`](block::BlockTask) that runs either inline on the caller's
//! thread or as a job on a [`WorkerPool`](pool::WorkerPool). Both runners
//! report the same `(sequence, output)` messages, and the coordinator below
//! files them per block and drains blocks strictly in sequence order, so the
//! bytes handed to the caller always follow input order.
//!
//! ```text
//! input ──► open block ──Data/SyncFlush/Finish──► runner (inline | pool)
//!                                                     │
//! output ◄── ready queue ◄── drain in order ◄── slots by sequence
//! ```

mod block;
mod pool;

use crate::config::EncoderConfig;
use crate::xz::{IndexBuilder, StreamFlags, encode_stream_footer, encode_stream_header};
use block::{BlockInput, BlockOutput, BlockTask};
use oxixz_core::check::CheckKind;
use oxixz_core::error::{Result, XzError};
use oxixz_core::status::{Action, Status};
use oxixz_core::traits::StreamCoder;
use oxixz_lzma::Preset;
use pool::WorkerPool;
use std::collections::VecDeque;

/// Input gathered before it is handed to a block.
const STAGE_SIZE: usize = 64 * 1024;

/// Encoded bytes buffered for the caller before input intake pauses.
const READY_HIGH_WATER: usize = 1 << 20;

/// Drives block tasks and returns their outputs.
enum Runner {
    /// One block at a time on the caller's thread.
    Inline {
        preset: Preset,
        check: CheckKind,
        task: Option<BlockTask>,
        outbox: VecDeque<(u64, BlockOutput)>,
    },
    /// Blocks run concurrently on worker threads.
    Pool(WorkerPool),
}

impl Runner {
    fn start(&mut self, seq: u64) -> Result<()> {
        match self {
            Runner::Inline {
                preset,
                check,
                task,
                outbox,
            } => {
                let mut emit = |output: BlockOutput| outbox.push_back((seq, output));
                match BlockTask::new(seq, *preset, *check) {
                    Ok(mut new_task) => {
                        new_task.start(&mut emit);
                        *task = Some(new_task);
                    }
                    Err(err) => emit(BlockOutput::Failed(err)),
                }
                Ok(())
            }
            Runner::Pool(pool) => pool.start(seq),
        }
    }

    fn send(&mut self, seq: u64, input: BlockInput) -> Result<()> {
        match self {
            Runner::Inline { task, outbox, .. } => {
                let current = task
                    .as_mut()
                    .ok_or_else(|| XzError::program(format!("block {seq} is not accepting input")))?;
                let mut emit = |output: BlockOutput| outbox.push_back((seq, output));
                match current.handle(input, &mut emit) {
                    Ok(false) => {}
                    Ok(true) => *task = None,
                    Err(err) => {
                        *task = None;
                        emit(BlockOutput::Failed(err));
                    }
                }
                Ok(())
            }
            Runner::Pool(pool) => pool.send(seq, input),
        }
    }

    fn try_next(&mut self) -> Result<Option<(u64, BlockOutput)>> {
        match self {
            Runner::Inline { outbox, .. } => Ok(outbox.pop_front()),
            Runner::Pool(pool) => pool.try_recv(),
        }
    }

    fn next_blocking(&mut self) -> Result<(u64, BlockOutput)> {
        match self {
            Runner::Inline { outbox, .. } => outbox
                .pop_front()
                .ok_or_else(|| XzError::program("inline block has no pending output")),
            Runner::Pool(pool) => pool.recv(),
        }
    }
}

/// The block currently receiving input.
struct OpenBlock {
    seq: u64,
    fed: u64,
    staged: Vec<u8>,
}

/// Outputs of one block that have not been drained yet.
struct BlockSlot {
    seq: u64,
    outputs: VecDeque<BlockOutput>,
}

/// A flush or finish that has been requested but not completed.
#[derive(Debug)]
struct Flush {
    action: Action,
    /// All input of the flush has been taken and the blocks were told.
    begun: bool,
    /// Block whose sync-flush acknowledgement completes the flush.
    awaiting: Option<u64>,
    acked: bool,
}

/// Streaming XZ encoder.
///
/// The single-threaded and the block-parallel encoder are the same type;
/// only the runner differs.
pub struct StreamEncoder {
    check: CheckKind,
    block_size: u64,
    runner: Runner,
    max_inflight: usize,
    next_seq: u64,
    open: Option<OpenBlock>,
    blocks: VecDeque<BlockSlot>,
    ready: VecDeque<u8>,
    index: IndexBuilder,
    flush: Option<Flush>,
    trailer_written: bool,
    finished: bool,
    total_in: u64,
    total_out: u64,
}

impl StreamEncoder {
    /// Create an encoder. Starts the worker pool when more than one thread
    /// is configured.
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.threads as usize;
        let (runner, max_inflight) = if config.is_multithreaded() {
            let pool = WorkerPool::new(threads, config.preset, config.check)?;
            (Runner::Pool(pool), threads + 1)
        } else {
            let inline = Runner::Inline {
                preset: config.preset,
                check: config.check,
                task: None,
                outbox: VecDeque::new(),
            };
            (inline, 1)
        };

        let header = encode_stream_header(StreamFlags::new(config.check));
        let block_size = config.block_size();
        tracing::debug!(
            preset = %config.preset,
            check = config.check.name(),
            threads = config.threads,
            block_size,
            "XZ encoder initialized"
        );

        Ok(Self {
            check: config.check,
            block_size,
            runner,
            max_inflight,
            next_seq: 0,
            open: None,
            blocks: VecDeque::new(),
            ready: header.into_iter().collect(),
            index: IndexBuilder::new(),
            flush: None,
            trailer_written: false,
            finished: false,
            total_in: 0,
            total_out: 0,
        })
    }

    /// Index records of the blocks completed so far.
    pub fn index(&self) -> &IndexBuilder {
        &self.index
    }

    fn accept_action(&mut self, input: &[u8], action: Action) -> Result<()> {
        if self.finished {
            return Err(XzError::program("the stream is already finished"));
        }
        match &self.flush {
            Some(flush) if flush.action != action => Err(XzError::program(format!(
                "{action:?} requested while {:?} is in progress",
                flush.action
            ))),
            Some(flush) if flush.begun && !input.is_empty() => Err(XzError::program(format!(
                "new input supplied during {:?}",
                flush.action
            ))),
            Some(_) => Ok(()),
            None => {
                if action.is_flush() {
                    self.flush = Some(Flush {
                        action,
                        begun: false,
                        awaiting: None,
                        acked: false,
                    });
                }
                Ok(())
            }
        }
    }

    /// File a block output under its sequence number.
    fn file(&mut self, seq: u64, output: BlockOutput) -> Result<()> {
        let slot = self
            .blocks
            .iter_mut()
            .find(|slot| slot.seq == seq)
            .ok_or_else(|| XzError::program(format!("output for unknown block {seq}")))?;
        slot.outputs.push_back(output);
        Ok(())
    }

    /// File every output that is already available. Returns how many.
    fn collect(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some((seq, output)) = self.runner.try_next()? {
            self.file(seq, output)?;
            count += 1;
        }
        Ok(count)
    }

    /// Move outputs of the oldest blocks to the ready queue.
    fn drain(&mut self) -> Result<()> {
        while let Some(front) = self.blocks.front_mut() {
            let seq = front.seq;
            let Some(output) = front.outputs.pop_front() else {
                break;
            };
            match output {
                BlockOutput::Bytes(bytes) => self.ready.extend(bytes),
                BlockOutput::Flushed => {
                    if let Some(flush) = self.flush.as_mut() {
                        if flush.awaiting == Some(seq) {
                            flush.acked = true;
                        }
                    }
                }
                BlockOutput::Done(record) => {
                    self.index.push(record);
                    self.blocks.pop_front();
                }
                BlockOutput::Failed(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn open_block(&mut self) -> Result<()> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.blocks.push_back(BlockSlot {
            seq,
            outputs: VecDeque::new(),
        });
        self.open = Some(OpenBlock {
            seq,
            fed: 0,
            staged: Vec::with_capacity(STAGE_SIZE),
        });
        self.runner.start(seq)
    }

    fn send_staged(&mut self) -> Result<()> {
        let Some(open) = self.open.as_mut() else {
            return Ok(());
        };
        if open.staged.is_empty() {
            return Ok(());
        }
        let data = std::mem::replace(&mut open.staged, Vec::with_capacity(STAGE_SIZE));
        let seq = open.seq;
        self.runner.send(seq, BlockInput::Data(data))
    }

    fn close_block(&mut self) -> Result<()> {
        self.send_staged()?;
        if let Some(open) = self.open.take() {
            self.runner.send(open.seq, BlockInput::Finish)?;
        }
        Ok(())
    }

    /// Take input into blocks. Pauses when enough output is waiting for the
    /// caller or every block slot is busy.
    fn absorb(&mut self, input: &[u8]) -> Result<usize> {
        let mut taken = 0;
        while taken < input.len() && self.ready.len() < READY_HIGH_WATER {
            if self.open.is_none() {
                if self.blocks.len() >= self.max_inflight {
                    break;
                }
                self.open_block()?;
            }
            let block_size = self.block_size;
            let Some(open) = self.open.as_mut() else {
                break;
            };

            let block_room = usize::try_from(block_size - open.fed).unwrap_or(usize::MAX);
            let n = (input.len() - taken)
                .min(block_room)
                .min(STAGE_SIZE - open.staged.len());
            open.staged.extend_from_slice(&input[taken..taken + n]);
            open.fed += n as u64;
            taken += n;
            self.total_in += n as u64;

            if open.fed == block_size {
                self.close_block()?;
            } else if open.staged.len() == STAGE_SIZE {
                self.send_staged()?;
            }
        }
        Ok(taken)
    }

    /// Tell the blocks about a pending flush once all its input is taken.
    fn begin_flush(&mut self) -> Result<bool> {
        let action = match &self.flush {
            Some(flush) if !flush.begun => flush.action,
            _ => return Ok(false),
        };

        let mut awaiting = None;
        if action == Action::SyncFlush {
            self.send_staged()?;
            if let Some(seq) = self.open.as_ref().map(|open| open.seq) {
                self.runner.send(seq, BlockInput::SyncFlush)?;
                awaiting = Some(seq);
            }
        } else {
            self.close_block()?;
        }

        if let Some(flush) = self.flush.as_mut() {
            flush.begun = true;
            flush.awaiting = awaiting;
        }
        tracing::trace!(?action, pending_blocks = self.blocks.len(), "flush begun");
        Ok(true)
    }

    /// Append the index and stream footer once every block is done.
    fn settle(&mut self) -> Result<bool> {
        let finishing = matches!(
            &self.flush,
            Some(Flush {
                action: Action::Finish,
                begun: true,
                ..
            })
        );
        if !finishing || self.trailer_written || !self.blocks.is_empty() {
            return Ok(false);
        }

        let index = self.index.encode();
        let footer = encode_stream_footer(StreamFlags::new(self.check), index.len() as u64)?;
        tracing::debug!(
            blocks = self.index.records().len(),
            uncompressed = self.index.uncompressed_size(),
            "stream trailer queued"
        );
        self.ready.extend(index);
        self.ready.extend(footer);
        self.trailer_written = true;
        Ok(true)
    }

    fn emit(&mut self, output: &mut [u8]) -> usize {
        let n = output.len().min(self.ready.len());
        for (dst, src) in output.iter_mut().zip(self.ready.drain(..n)) {
            *dst = src;
        }
        self.total_out += n as u64;
        n
    }

    /// Complete the pending flush if its conditions hold.
    fn complete_flush(&mut self) -> Option<Status> {
        let flush = self.flush.as_ref()?;
        if !flush.begun {
            return None;
        }
        let drained = self.ready.is_empty();
        let done = match flush.action {
            Action::SyncFlush => {
                drained && (flush.acked || (flush.awaiting.is_none() && self.blocks.is_empty()))
            }
            Action::FullFlush => drained && self.blocks.is_empty(),
            Action::FullBarrier | Action::Run => true,
            Action::Finish => drained && self.trailer_written,
        };
        if !done {
            return None;
        }

        let action = flush.action;
        self.flush = None;
        if action == Action::Finish {
            self.finished = true;
            tracing::debug!(
                blocks = self.index.records().len(),
                total_in = self.total_in,
                total_out = self.total_out,
                "XZ stream finished"
            );
        }
        Some(Status::StreamEnd)
    }

    /// Whether the only way forward is to wait for a worker.
    fn must_wait(&self, input_left: bool) -> bool {
        if !self.ready.is_empty() || self.blocks.is_empty() {
            return false;
        }
        let flushing = self.flush.as_ref().is_some_and(|flush| flush.begun);
        let starved =
            input_left && self.open.is_none() && self.blocks.len() >= self.max_inflight;
        flushing || starved
    }
}

impl StreamCoder for StreamEncoder {
    fn code(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Status> {
        self.accept_action(input, action)?;

        let mut in_pos = 0;
        let mut out_pos = 0;
        loop {
            let collected = self.collect()?;
            self.drain()?;

            let taken = self.absorb(&input[in_pos..])?;
            in_pos += taken;
            let begun = in_pos == input.len() && self.begin_flush()?;
            let settled = self.settle()?;

            let written = self.emit(&mut output[out_pos..]);
            out_pos += written;

            if let Some(status) = self.complete_flush() {
                return Ok(status);
            }
            if out_pos == output.len() && !self.ready.is_empty() {
                return Ok(Status::Ok);
            }
            if collected > 0 || taken > 0 || written > 0 || begun || settled {
                continue;
            }
            if self.must_wait(in_pos < input.len()) {
                let (seq, output) = self.runner.next_blocking()?;
                self.file(seq, output)?;
                continue;
            }
            return Ok(Status::Ok);
        }
    }

    fn total_in(&self) -> u64 {
        self.total_in
    }

    fn total_out(&self) -> u64 {
        self.total_out
    }

    fn is_blocked(&self, _input_empty: bool, output_empty: bool) -> bool {
        output_empty && (!self.ready.is_empty() || !self.blocks.is_empty() || self.flush.is_some())
    }

    fn check(&self) -> Option<CheckKind> {
        Some(self.check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xz::{XZ_FOOTER_MAGIC, XZ_MAGIC, decode_stream_footer};

    fn encode(config: &EncoderConfig, data: &[u8], chunk: usize) -> Vec<u8> {
        let mut encoder = StreamEncoder::new(config).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; 4096];
        for piece in data.chunks(chunk.max(1)) {
            let mut rest = piece;
            while !rest.is_empty() {
                let before = encoder.total_in();
                let status = encoder.code(rest, &mut buf, Action::Run).unwrap();
                assert_eq!(status, Status::Ok);
                let consumed = (encoder.total_in() - before) as usize;
                rest = &rest[consumed..];
                out.extend_from_slice(&buf[..encoder.total_out() as usize - out.len()]);
            }
        }
        loop {
            let status = encoder.code(&[], &mut buf, Action::Finish).unwrap();
            out.extend_from_slice(&buf[..encoder.total_out() as usize - out.len()]);
            if status == Status::StreamEnd {
                return out;
            }
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 7) % 251) as u8).collect()
    }

    #[test]
    fn test_empty_stream_layout() {
        let stream = encode(&EncoderConfig::new(Preset::FAST), &[], 1);
        // Header, empty index, footer.
        assert_eq!(stream.len(), 12 + 8 + 12);
        assert_eq!(&stream[..6], &XZ_MAGIC);
        assert_eq!(&stream[stream.len() - 2..], &XZ_FOOTER_MAGIC);
        let footer = decode_stream_footer(&stream[stream.len() - 12..]).unwrap();
        assert_eq!(footer.index_size, 8);
    }

    #[test]
    fn test_blocks_split_at_block_size() {
        let config = EncoderConfig::new(Preset::FAST).with_block_size(10_000);
        let data = sample(25_000);
        let mut encoder = StreamEncoder::new(&config).unwrap();
        let mut buf = vec![0u8; 1 << 16];
        let status = encoder.code(&data, &mut buf, Action::Finish).unwrap();
        assert_eq!(status, Status::StreamEnd);

        let sizes: Vec<u64> = encoder
            .index()
            .records()
            .iter()
            .map(|r| r.uncompressed_size)
            .collect();
        assert_eq!(sizes, [10_000, 10_000, 5_000]);
        assert_eq!(encoder.total_in(), 25_000);
    }

    #[test]
    fn test_pool_matches_inline() {
        let data = sample(200_000);
        let inline = EncoderConfig::new(Preset::FAST).with_block_size(32 * 1024);
        let pooled = inline.with_threads(4);
        let expected = encode(&inline, &data, 100_000);
        assert_eq!(encode(&pooled, &data, 100_000), expected);
        assert_eq!(encode(&pooled, &data, 777), expected);
    }

    #[test]
    fn test_action_switch_during_flush() {
        let mut encoder = StreamEncoder::new(&EncoderConfig::new(Preset::FAST)).unwrap();
        let data = sample(4096);
        let mut tiny = [0u8; 4];
        assert_eq!(
            encoder.code(&data, &mut tiny, Action::FullFlush).unwrap(),
            Status::Ok
        );
        let err = encoder.code(&[], &mut tiny, Action::Finish).unwrap_err();
        assert_eq!(err.status(), Status::ProgError);
    }

    #[test]
    fn test_input_after_flush_begun() {
        let mut encoder = StreamEncoder::new(&EncoderConfig::new(Preset::FAST)).unwrap();
        let mut tiny = [0u8; 1];
        encoder.code(b"abc", &mut tiny, Action::SyncFlush).unwrap();
        let err = encoder
            .code(b"more", &mut tiny, Action::SyncFlush)
            .unwrap_err();
        assert_eq!(err.status(), Status::ProgError);
    }

    #[test]
    fn test_flush_then_continue() {
        let mut encoder = StreamEncoder::new(&EncoderConfig::new(Preset::FAST)).unwrap();
        let mut buf = vec![0u8; 4096];
        assert_eq!(
            encoder.code(b"part one", &mut buf, Action::SyncFlush).unwrap(),
            Status::StreamEnd
        );
        assert_eq!(
            encoder.code(b"part two", &mut buf, Action::FullFlush).unwrap(),
            Status::StreamEnd
        );
        assert_eq!(encoder.index().records().len(), 1);
        assert_eq!(
            encoder.code(&[], &mut buf, Action::Finish).unwrap(),
            Status::StreamEnd
        );
        assert!(encoder.code(&[], &mut buf, Action::Run).is_err());
    }

    #[test]
    fn test_blocked_on_empty_output() {
        let mut encoder = StreamEncoder::new(&EncoderConfig::new(Preset::FAST)).unwrap();
        let status = encoder.code(&[], &mut [], Action::Run).unwrap();
        assert_eq!(status, Status::Ok);
        // The stream header is waiting for output space.
        assert!(encoder.is_blocked(true, true));
        assert!(!encoder.is_blocked(true, false));
    }
}
