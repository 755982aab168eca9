//! Streaming sample pipeline
//!
//! Data flow (receive): producer → `SampleRing` → worker → `Channelizer` →
//! `ChannelSink`. Transmit runs the same machinery backwards.
//! Control flow: any thread → `ConfigChannel` → worker, applied between
//! data drains.
//!
//! One mutex guards the ring, the current configuration and all filter
//! state. Messages are dispatched while that lock is already held, so the
//! lock is never taken re-entrantly.

pub mod channel;
pub mod rx;
pub mod tx;
pub mod worker;

pub use channel::ConfigChannel;
pub use rx::{RxBaseband, RxProducer};
pub use tx::TxBaseband;
pub use worker::{Baseband, PipelineWorker, WorkerSignal};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::domain::{ChannelInfo, LevelReport, PipelineError, PipelineResult};

/// Capacity of the outbound notification queue; older readers lose events
pub const EVENT_QUEUE_DEPTH: usize = 64;

/// Samples processed between two checks of the config channel
pub const DRAIN_CHUNK: usize = 4096;

/// Notifications emitted by a pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineEvent {
    /// Aggregated levels of one drain cycle
    Levels(LevelReport),
    /// Channelization (re)installed
    ChannelChanged(ChannelInfo),
    /// A queued configuration could not be installed
    ConfigRejected(String),
    /// A message the consumer did not handle
    Unhandled(&'static str),
}

/// Signal and notification plumbing shared by both directions
pub(crate) struct Control {
    messages: ConfigChannel,
    signal_tx: Sender<WorkerSignal>,
    signal_rx: Receiver<WorkerSignal>,
    events_tx: Sender<PipelineEvent>,
    events_rx: Receiver<PipelineEvent>,
}

impl Control {
    pub(crate) fn new() -> Self {
        let (signal_tx, signal_rx) = crossbeam_channel::bounded(1);
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_QUEUE_DEPTH);
        Self {
            messages: ConfigChannel::new(signal_tx.clone()),
            signal_tx,
            signal_rx,
            events_tx,
            events_rx,
        }
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => log::trace!("event queue full, dropped {event:?}"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Wake the worker; a pending signal already covers this one
    pub(crate) fn wake(&self, signal: WorkerSignal) {
        let _ = self.signal_tx.try_send(signal);
    }

    pub(crate) fn signals(&self) -> (Sender<WorkerSignal>, Receiver<WorkerSignal>) {
        (self.signal_tx.clone(), self.signal_rx.clone())
    }
}

/// Rate seen by the channelizer after the hardware-edge decimation
pub(crate) fn baseband_rate(device_rate: u32, log2_decim: u32) -> PipelineResult<u32> {
    let rate = device_rate.checked_shr(log2_decim).unwrap_or(0);
    if rate == 0 {
        return Err(PipelineError::InvalidSampleRate(device_rate as i64));
    }
    Ok(rate)
}
