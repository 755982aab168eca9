//! Pipeline worker thread
//!
//! The worker sleeps on a signal channel and runs one drain cycle per
//! wake-up: `Idle -> Draining -> Idle`. Signals that arrive during a cycle
//! collapse into the next one.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};

use crate::domain::PipelineResult;

/// How long one stop request waits for a free signal slot
const STOP_RETRY: Duration = Duration::from_millis(10);

/// Wake-up reasons for the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// The producer (or device reader) moved `n` samples
    DataReady(usize),
    /// A message was pushed onto the config channel
    MessagesQueued,
    Stop,
}

/// Something the worker can drain
pub trait Baseband: Send + Sync + 'static {
    /// Thread name prefix
    fn name(&self) -> &'static str;

    /// Sender and receiver of this pipeline's signal channel
    fn signals(&self) -> (Sender<WorkerSignal>, Receiver<WorkerSignal>);

    /// One full drain cycle: messages first, then data
    fn handle_data(&self);
}

/// Handle to a running worker thread. Dropping it stops the thread.
pub struct PipelineWorker {
    handle: Option<JoinHandle<()>>,
    signals: Sender<WorkerSignal>,
}

impl PipelineWorker {
    pub fn spawn<B: Baseband>(baseband: Arc<B>) -> PipelineResult<Self> {
        let (signals, receiver) = baseband.signals();
        let handle = thread::Builder::new()
            .name(format!("{}-worker", baseband.name()))
            .spawn(move || run(baseband, receiver))?;
        Ok(Self {
            handle: Some(handle),
            signals,
        })
    }

    /// `false` once the thread has exited, including by panic
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the worker to finish its current cycle and exit, then join it.
    ///
    /// The signal slot may hold a wake-up nobody will read if the thread
    /// already died, so the stop request is retried only while it runs.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            while !handle.is_finished() {
                match self.signals.send_timeout(WorkerSignal::Stop, STOP_RETRY) {
                    Ok(()) | Err(SendTimeoutError::Disconnected(_)) => break,
                    Err(SendTimeoutError::Timeout(_)) => {}
                }
            }
            if handle.join().is_err() {
                log::error!("pipeline worker panicked");
            }
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<B: Baseband>(baseband: Arc<B>, receiver: Receiver<WorkerSignal>) {
    log::debug!("{} worker started", baseband.name());
    'outer: while let Ok(signal) = receiver.recv() {
        if signal == WorkerSignal::Stop {
            break;
        }
        for extra in receiver.try_iter() {
            if extra == WorkerSignal::Stop {
                baseband.handle_data();
                break 'outer;
            }
        }
        baseband.handle_data();
    }
    log::debug!("{} worker stopped", baseband.name());
}
