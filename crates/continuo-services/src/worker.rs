//! Background generation worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ModelEngine, ModelError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job queue full")]
    QueueFull,
    #[error("Worker shut down")]
    ShutDown,
}

/// One generation request.
///
/// Immutable on the submission side; the worker writes the result exactly
/// once and flips the done flag with release ordering, so a reader that
/// observes `is_done()` sees the result.
pub struct GenerationJob {
    pub bar_index: u32,
    /// Bar-boundary pulse at submission time; used to detect stale results.
    pub boundary_pulse: u64,
    pub prompt_midi: Vec<u8>,
    pub temperature: f32,
    pub top_p: f32,
    pub gen_bars: u32,
    done: AtomicBool,
    result: Mutex<Option<Result<Vec<u8>, ModelError>>>,
}

impl GenerationJob {
    pub fn new(
        bar_index: u32,
        boundary_pulse: u64,
        prompt_midi: Vec<u8>,
        temperature: f32,
        top_p: f32,
        gen_bars: u32,
    ) -> Self {
        Self {
            bar_index,
            boundary_pulse,
            prompt_midi,
            temperature,
            top_p,
            gen_bars,
            done: AtomicBool::new(false),
            result: Mutex::new(None),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Consume the result; `None` until the worker has published it.
    pub fn take_result(&self) -> Option<Result<Vec<u8>, ModelError>> {
        if !self.is_done() {
            return None;
        }
        self.result.lock().ok().and_then(|mut slot| slot.take())
    }

    fn complete(&self, result: Result<Vec<u8>, ModelError>) {
        if let Ok(mut slot) = self.result.lock() {
            *slot = Some(result);
        }
        self.done.store(true, Ordering::Release);
    }
}

/// Single background thread running generation jobs in FIFO order.
///
/// At most one job runs at a time; an in-flight model call cannot be
/// cancelled. Dropping the submission side lets the worker finish its
/// current job and exit.
pub struct GenerationWorker {
    tx: Option<Sender<Arc<GenerationJob>>>,
    handle: Option<JoinHandle<()>>,
}

impl GenerationWorker {
    pub fn spawn(engine: Arc<dyn ModelEngine>) -> Self {
        let (tx, rx) = bounded::<Arc<GenerationJob>>(4);
        let handle = thread::spawn(move || worker_loop(engine, rx));
        Self { tx: Some(tx), handle: Some(handle) }
    }

    /// Enqueue a job without blocking. Queue depth stays at 0 or 1 in steady
    /// state; a full queue means generation has fallen badly behind and the
    /// job is refused.
    pub fn submit(&self, job: Arc<GenerationJob>) -> Result<(), WorkerError> {
        let Some(tx) = &self.tx else {
            return Err(WorkerError::ShutDown);
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(WorkerError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::ShutDown),
        }
    }

    /// Stop accepting jobs; the worker exits after the in-flight job.
    pub fn shutdown(&mut self) {
        self.tx.take();
    }

    pub fn join(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn worker_loop(engine: Arc<dyn ModelEngine>, rx: Receiver<Arc<GenerationJob>>) {
    while let Ok(job) = rx.recv() {
        let horizon_s = job.gen_bars as f32;
        info!(
            "[gen_worker] Starting bar={} gen_bars={} horizon_s={}",
            job.bar_index, job.gen_bars, horizon_s
        );

        let result = engine.generate(&job.prompt_midi, horizon_s, job.temperature, job.top_p);
        match &result {
            Ok(blob) => info!("[gen_worker] done bar={} bytes={}", job.bar_index, blob.len()),
            Err(e) => warn!("[gen_worker] done bar={} error: {e}", job.bar_index),
        }
        job.complete(result);
    }
    debug!("generation worker exiting");
}
