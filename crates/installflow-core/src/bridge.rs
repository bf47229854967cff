//! Moves blocking work onto worker threads and results back onto the event loop.
//!
//! The event loop owns a single-consumer queue of callbacks. Any thread may push
//! onto it through a [`LoopSender`]; the loop dispatches one callback per wake and
//! is the only place state is mutated. [`Bridge::run_in_background`] pairs that
//! queue with a fixed worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel as channel;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::EngineError;

/// A unit of work to run against loop-owned state `S`.
pub type Callback<S> = Box<dyn FnOnce(&mut S) -> Result<(), EngineError> + Send + 'static>;

/// Cloneable handle for scheduling callbacks onto the event loop from any thread.
pub struct LoopSender<S> {
    tx: mpsc::UnboundedSender<Callback<S>>,
}

impl<S> Clone for LoopSender<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> LoopSender<S> {
    /// Queue `f` to run on the event loop thread.
    pub fn call_from_thread<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut S) -> Result<(), EngineError> + Send + 'static,
    {
        self.tx
            .send(Box::new(f))
            .map_err(|_| EngineError::LoopClosed)
    }
}

/// Loop-side end of the callback queue.
pub struct LoopReceiver<S> {
    rx: mpsc::UnboundedReceiver<Callback<S>>,
}

impl<S> LoopReceiver<S> {
    /// Wait for the next queued callback. Cancel safe.
    pub async fn next(&mut self) -> Option<Callback<S>> {
        self.rx.recv().await
    }
}

pub fn loop_channel<S>() -> (LoopSender<S>, LoopReceiver<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LoopSender { tx }, LoopReceiver { rx })
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named threads draining a shared job queue.
#[derive(Clone)]
pub struct WorkerPool {
    tx: channel::Sender<Job>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, EngineError> {
        let (tx, rx) = channel::unbounded::<Job>();
        let mut spawned = 0usize;
        for idx in 0..worker_count.max(1) {
            let rx = rx.clone();
            match std::thread::Builder::new()
                .name(format!("installflow-worker-{idx}"))
                .spawn(move || run_worker(rx))
            {
                Ok(_) => spawned += 1,
                Err(err) => {
                    warn!(?err, "failed to spawn background worker thread");
                }
            }
        }
        if spawned == 0 {
            return Err(EngineError::NoWorkers);
        }
        debug!(workers = spawned, "background worker pool started");
        Ok(Self { tx })
    }

    fn submit(&self, job: Job) -> Result<(), EngineError> {
        self.tx.send(job).map_err(|_| EngineError::NoWorkers)
    }
}

fn run_worker(rx: channel::Receiver<Job>) {
    // Workers exit once every pool handle has been dropped.
    for job in rx.iter() {
        job();
    }
}

/// Runs blocking closures on the worker pool and reports back on the loop.
pub struct Bridge<S> {
    pool: WorkerPool,
    loop_tx: LoopSender<S>,
}

impl<S> Clone for Bridge<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            loop_tx: self.loop_tx.clone(),
        }
    }
}

impl<S> Bridge<S> {
    pub fn new(pool: WorkerPool, loop_tx: LoopSender<S>) -> Self {
        Self { pool, loop_tx }
    }

    pub fn sender(&self) -> &LoopSender<S> {
        &self.loop_tx
    }

    /// Run `work` on a worker thread, then `on_done` exactly once on the loop thread.
    ///
    /// Errors and panics raised by `work` are handed to `on_done` as values.
    pub fn run_in_background<T, W, D>(&self, work: W, on_done: D) -> Result<(), EngineError>
    where
        T: Send + 'static,
        W: FnOnce() -> Result<T, EngineError> + Send + 'static,
        D: FnOnce(&mut S, Result<T, EngineError>) -> Result<(), EngineError> + Send + 'static,
        S: 'static,
    {
        let loop_tx = self.loop_tx.clone();
        self.pool.submit(Box::new(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => result,
                Err(payload) => Err(EngineError::TaskPanicked(panic_message(payload.as_ref()))),
            };
            if loop_tx
                .call_from_thread(move |state| on_done(state, result))
                .is_err()
            {
                warn!("event loop closed before a background result was delivered");
            }
        }))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
