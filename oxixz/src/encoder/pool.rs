//! Fixed-size worker pool for block-parallel encoding.
//!
//! Each block runs as one job on a `rayon::ThreadPool`. The coordinator
//! feeds a block through its own `crossbeam_channel` and every job reports
//! `(sequence, output)` pairs on a shared result channel. Jobs are queued
//! FIFO, so blocks start in sequence order.

use crate::encoder::block::{BlockInput, BlockOutput, BlockTask};
use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use oxixz_core::check::CheckKind;
use oxixz_core::error::{Result, XzError};
use oxixz_lzma::Preset;
use rayon::ThreadPool as RayonPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

type Message = (u64, BlockOutput);

struct PoolState {
    /// Jobs spawned but not yet returned.
    pending: usize,
    /// Worker threads that have not exited.
    live_threads: usize,
}

struct Shared {
    state: Mutex<PoolState>,
    changed: Condvar,
    cancelled: AtomicBool,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut PoolState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
            self.changed.notify_all();
        }
    }

    /// Block until `done` holds; gives up quietly on a poisoned lock.
    fn wait_until(&self, done: impl Fn(&PoolState) -> bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        while !done(&state) {
            state = match self.changed.wait(state) {
                Ok(state) => state,
                Err(_) => return,
            };
        }
    }
}

/// Decrements the pending count when a job returns, however it returns.
struct JobGuard(Arc<Shared>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.update(|state| state.pending -= 1);
    }
}

/// Worker pool owned by one encoder.
pub(crate) struct WorkerPool {
    pool: Option<RayonPool>,
    shared: Arc<Shared>,
    inputs: HashMap<u64, Sender<BlockInput>>,
    results_tx: Sender<Message>,
    results_rx: Receiver<Message>,
    preset: Preset,
    check: CheckKind,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize, preset: Preset, check: CheckKind) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                pending: 0,
                live_threads: threads,
            }),
            changed: Condvar::new(),
            cancelled: AtomicBool::new(false),
        });

        let on_exit = Arc::clone(&shared);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("oxixz-block-{i}"))
            .exit_handler(move |_| on_exit.update(|state| state.live_threads -= 1))
            .build()
            .map_err(|e| XzError::mem(format!("cannot start {threads} worker threads: {e}")))?;

        let (results_tx, results_rx) = unbounded();
        tracing::debug!(threads, "worker pool started");
        Ok(Self {
            pool: Some(pool),
            shared,
            inputs: HashMap::new(),
            results_tx,
            results_rx,
            preset,
            check,
        })
    }

    /// Queue the job for block `seq`.
    pub(crate) fn start(&mut self, seq: u64) -> Result<()> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| XzError::program("worker pool already shut down"))?;

        let (tx, rx) = unbounded();
        self.inputs.insert(seq, tx);
        self.shared.update(|state| state.pending += 1);

        let guard = JobGuard(Arc::clone(&self.shared));
        let results = self.results_tx.clone();
        let (preset, check) = (self.preset, self.check);
        pool.spawn(move || run_block(seq, preset, check, rx, results, guard));
        Ok(())
    }

    /// Send a message to block `seq`. `Finish` is the last message a block
    /// receives.
    pub(crate) fn send(&mut self, seq: u64, input: BlockInput) -> Result<()> {
        let last = matches!(input, BlockInput::Finish);
        let tx = self
            .inputs
            .get(&seq)
            .ok_or_else(|| XzError::program(format!("block {seq} is not accepting input")))?;
        // A disconnected block has already reported `Failed`, which
        // surfaces when its results are drained.
        let _ = tx.send(input);
        if last {
            self.inputs.remove(&seq);
        }
        Ok(())
    }

    /// Next result if one is ready.
    pub(crate) fn try_recv(&self) -> Result<Option<Message>> {
        match self.results_rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(XzError::program("result channel closed")),
        }
    }

    /// Wait for the next result.
    pub(crate) fn recv(&self) -> Result<Message> {
        self.results_rx
            .recv()
            .map_err(|_| XzError::program("result channel closed"))
    }
}

impl Drop for WorkerPool {
    /// Cancel in-flight blocks, wait for their jobs to return and join the
    /// worker threads.
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.inputs.clear();
        self.shared.wait_until(|state| state.pending == 0);
        drop(self.pool.take());
        self.shared.wait_until(|state| state.live_threads == 0);
        tracing::debug!("worker pool joined");
    }
}

fn run_block(
    seq: u64,
    preset: Preset,
    check: CheckKind,
    inputs: Receiver<BlockInput>,
    results: Sender<Message>,
    guard: JobGuard,
) {
    let cancelled = || guard.0.cancelled.load(Ordering::Acquire);
    if cancelled() {
        return;
    }

    let mut emit = |output: BlockOutput| {
        let _ = results.send((seq, output));
    };
    let mut task = match BlockTask::new(seq, preset, check) {
        Ok(task) => task,
        Err(err) => return emit(BlockOutput::Failed(err)),
    };
    task.start(&mut emit);

    for input in inputs.iter() {
        if cancelled() {
            return;
        }
        match task.handle(input, &mut emit) {
            Ok(false) => {}
            Ok(true) => return,
            Err(err) => return emit(BlockOutput::Failed(err)),
        }
    }
}
