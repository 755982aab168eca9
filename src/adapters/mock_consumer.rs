//! Mock demodulator and modulator for development and testing.
//!
//! `RecordingSink` keeps everything the pipeline hands it in a shared log
//! so tests can inspect ordering after the fact. `ToneSource` is a modulator
//! that emits a single complex tone at the channel rate.
//!
//! Every control call is logged at INFO level so a CLI run shows exactly
//! what a real modem would have been told.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{ChannelInfo, LevelReport, PipelineConfig, Sample};
use crate::dsp::Nco;
use crate::ports::{ChannelSink, ChannelSource};

/// One call received by a `RecordingSink`, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEntry {
    Channel(ChannelInfo),
    Settings { config: PipelineConfig, force: bool },
    Payload(Vec<u8>),
    /// A batch of this many samples
    Feed(usize),
    Levels(LevelReport),
}

#[derive(Default)]
struct LogInner {
    entries: Vec<SinkEntry>,
    samples: Vec<Sample>,
}

/// Shared view of what a `RecordingSink` received
#[derive(Clone, Default)]
pub struct SinkLog {
    inner: Arc<Mutex<LogInner>>,
}

impl SinkLog {
    pub fn entries(&self) -> Vec<SinkEntry> {
        self.lock().entries.clone()
    }

    /// Every channel sample fed so far
    pub fn samples(&self) -> Vec<Sample> {
        self.lock().samples.clone()
    }

    pub fn fed_samples(&self) -> usize {
        self.lock().samples.len()
    }

    /// Channel installs seen, oldest first
    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.lock()
            .entries
            .iter()
            .filter_map(|e| match e {
                SinkEntry::Channel(info) => Some(*info),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct RecordingSink {
    log: SinkLog,
    accept_payloads: bool,
}

impl RecordingSink {
    /// Sink plus the log it writes to
    pub fn new() -> (Self, SinkLog) {
        let log = SinkLog::default();
        let sink = Self {
            log: log.clone(),
            accept_payloads: true,
        };
        (sink, log)
    }

    /// A sink that reports payloads as unhandled
    pub fn rejecting_payloads() -> (Self, SinkLog) {
        let (mut sink, log) = Self::new();
        sink.accept_payloads = false;
        (sink, log)
    }
}

impl ChannelSink for RecordingSink {
    fn feed(&mut self, samples: &[Sample]) {
        log::trace!("[MOCK SINK] feed {} samples", samples.len());
        let mut inner = self.log.lock();
        inner.entries.push(SinkEntry::Feed(samples.len()));
        inner.samples.extend_from_slice(samples);
    }

    fn apply_channel(&mut self, info: ChannelInfo) {
        log::info!(
            "[MOCK SINK] channel {} Hz at {:+} Hz",
            info.channel_rate,
            info.frequency_offset
        );
        self.log.lock().entries.push(SinkEntry::Channel(info));
    }

    fn apply_settings(&mut self, config: &PipelineConfig, force: bool) {
        log::info!("[MOCK SINK] settings force={force} modem={:?}", config.modem);
        self.log.lock().entries.push(SinkEntry::Settings {
            config: config.clone(),
            force,
        });
    }

    fn set_payload(&mut self, payload: &[u8]) -> bool {
        if !self.accept_payloads {
            return false;
        }
        log::info!("[MOCK SINK] payload {} bytes", payload.len());
        self.log.lock().entries.push(SinkEntry::Payload(payload.to_vec()));
        true
    }

    fn levels(&mut self, report: LevelReport) {
        log::trace!("[MOCK SINK] rms {:.4} over {} samples", report.rms, report.samples);
        self.log.lock().entries.push(SinkEntry::Levels(report));
    }
}

/// Modulator emitting `amplitude × e^{j2πft}` at the channel rate
pub struct ToneSource {
    frequency: f64,
    amplitude: f32,
    nco: Nco,
}

impl ToneSource {
    pub fn new(frequency: f64) -> Self {
        log::info!("[MOCK SOURCE] tone at {frequency:+} Hz");
        Self {
            frequency,
            amplitude: 0.5,
            nco: Nco::new(frequency, 48_000.0),
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

impl ChannelSource for ToneSource {
    fn pull(&mut self, out: &mut [Sample]) {
        for s in out.iter_mut() {
            let (i, q) = self.nco.next_iq();
            *s = Sample::new(i * self.amplitude, q * self.amplitude);
        }
    }

    fn apply_channel(&mut self, info: ChannelInfo) {
        log::info!("[MOCK SOURCE] channel rate {} Hz", info.channel_rate);
        self.nco
            .set_sample_rate(self.frequency, info.channel_rate.max(1) as f64);
    }

    /// Payload is `f64` LE: the new tone frequency in Hz
    fn set_payload(&mut self, payload: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 8]>::try_from(payload) else {
            log::warn!("[MOCK SOURCE] ignoring {} byte payload", payload.len());
            return false;
        };
        self.frequency = f64::from_le_bytes(bytes);
        self.nco.set_frequency(self.frequency);
        log::info!("[MOCK SOURCE] tone moved to {:+} Hz", self.frequency);
        true
    }
}
