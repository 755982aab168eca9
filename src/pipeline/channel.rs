//! ConfigChannel: FIFO of configuration messages for the pipeline worker
//!
//! Any thread may `push`; only the worker calls `pop_all`. Pushing never
//! waits on the pipeline lock, only on the short-lived queue lock.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Sender;

use crate::domain::ConfigMessage;

use super::worker::WorkerSignal;

pub struct ConfigChannel {
    queue: Mutex<VecDeque<ConfigMessage>>,
    notify: Sender<WorkerSignal>,
}

impl ConfigChannel {
    pub fn new(notify: Sender<WorkerSignal>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify,
        }
    }

    /// Enqueue a message and wake the worker. Never blocks on the worker.
    pub fn push(&self, message: ConfigMessage) {
        log::debug!("config channel: queued {}", message.kind());
        self.lock().push_back(message);
        // A full signal slot already guarantees another drain cycle
        let _ = self.notify.try_send(WorkerSignal::MessagesQueued);
    }

    /// Take every pending message in submission order
    pub fn pop_all(&self) -> Vec<ConfigMessage> {
        self.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ConfigMessage>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
