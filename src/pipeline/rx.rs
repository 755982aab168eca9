//! Receive baseband: producer → ring → channelizer → demodulator
//!
//! The producer side (`RxProducer`) only takes the lock long enough to copy
//! into the ring. When the ring is full the newest samples are dropped and
//! counted; the capture callback never waits for the worker.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender};

use crate::domain::{
    ChannelInfo, ConfigMessage, PipelineConfig, PipelineParams, PipelineResult, PipelineStats,
    Sample,
};
use crate::dsp::{Channelizer, DecimationCascade, LevelMeter, SampleRing};
use crate::ports::ChannelSink;

use super::worker::{Baseband, PipelineWorker, WorkerSignal};
use super::{baseband_rate, Control, PipelineEvent, DRAIN_CHUNK};

struct RxState {
    config: PipelineConfig,
    device_rate: u32,
    ring: SampleRing,
    cascade: DecimationCascade,
    channelizer: Channelizer,
    meter: LevelMeter,
    sink: Box<dyn ChannelSink>,
    /// Decimated producer input awaiting the ring
    staging: Vec<Sample>,
    /// Channel samples of the batch being processed
    batch: Vec<Sample>,
    stats: PipelineStats,
}

/// Receive side of a pipeline instance
pub struct RxBaseband {
    state: Mutex<RxState>,
    control: Control,
}

impl RxBaseband {
    /// Build a receive pipeline.
    ///
    /// A non-positive sample rate or an unsupported configuration is an
    /// error here rather than a silent default.
    pub fn new(
        params: PipelineParams,
        config: PipelineConfig,
        mut sink: Box<dyn ChannelSink>,
    ) -> PipelineResult<Arc<Self>> {
        let device_rate = params.checked_rate()?;
        config.validate()?;
        let cascade = DecimationCascade::new(params.format, config.log2_decim)?;
        let baseband = baseband_rate(device_rate, config.log2_decim)?;

        let mut channelizer = Channelizer::new();
        channelizer.set_baseband_sample_rate(baseband);
        let info = channelizer.set_channelization(config.channel_rate(), config.frequency_offset)?;

        sink.apply_channel(info);
        sink.apply_settings(&config, true);
        log::info!(
            "rx pipeline: device {} Hz, baseband {} Hz, channel {} Hz",
            device_rate,
            baseband,
            info.channel_rate
        );

        Ok(Arc::new(Self {
            state: Mutex::new(RxState {
                config,
                device_rate,
                ring: SampleRing::new(SampleRing::size_policy(baseband)),
                cascade,
                channelizer,
                meter: LevelMeter::new(),
                sink,
                staging: Vec::new(),
                batch: Vec::new(),
                stats: PipelineStats::default(),
            }),
            control: Control::new(),
        }))
    }

    /// Handle for the producer thread
    pub fn producer(self: &Arc<Self>) -> RxProducer {
        RxProducer {
            baseband: Arc::clone(self),
        }
    }

    /// Start a worker thread draining this pipeline
    pub fn spawn_worker(self: &Arc<Self>) -> PipelineResult<PipelineWorker> {
        PipelineWorker::spawn(Arc::clone(self))
    }

    /// Queue a message for the worker
    pub fn push_message(&self, message: ConfigMessage) {
        self.control.messages.push(message);
    }

    /// Check `config` against the current rate, then queue it.
    ///
    /// Errors are returned to the caller and nothing is queued.
    pub fn configure(&self, config: PipelineConfig, force: bool) -> PipelineResult<()> {
        config.validate()?;
        let device_rate = self.lock_state().device_rate;
        let baseband = baseband_rate(device_rate, config.log2_decim)?;
        Channelizer::supports(baseband, config.channel_rate())?;
        self.push_message(ConfigMessage::ApplyConfig { config, force });
        Ok(())
    }

    /// Achieved channelization, for display
    pub fn channel_info(&self) -> ChannelInfo {
        self.lock_state().channelizer.info()
    }

    pub fn config(&self) -> PipelineConfig {
        self.lock_state().config.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock_state().stats
    }

    /// Notification stream (levels, channel changes, rejections)
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.control.events_rx.clone()
    }

    /// Drop buffered samples and filter history.
    ///
    /// Only call once the producer is stopped and the worker joined.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.ring.reset();
        state.cascade.reset();
        state.channelizer.reset();
    }

    /// Drain every pending message, dispatching each in order
    pub fn handle_input_messages(&self) {
        let mut state = self.lock_state();
        self.dispatch_pending(&mut state);
    }

    fn dispatch_pending(&self, state: &mut RxState) {
        for message in self.control.messages.pop_all() {
            let kind = message.kind();
            if !self.handle_message(state, message) {
                log::warn!("rx pipeline: unhandled message {kind}");
                self.control.emit(PipelineEvent::Unhandled(kind));
            }
        }
    }

    fn handle_message(&self, state: &mut RxState, message: ConfigMessage) -> bool {
        match message {
            ConfigMessage::ApplyConfig { config, force } => {
                if let Err(e) = self.apply_settings(state, config, force) {
                    log::warn!("rx pipeline: configuration rejected: {e}");
                    self.control.emit(PipelineEvent::ConfigRejected(e.to_string()));
                }
                true
            }
            ConfigMessage::SetPayload(payload) => {
                log::debug!("rx pipeline: payload of {} bytes", payload.len());
                state.sink.set_payload(&payload)
            }
            ConfigMessage::RateChanged(rate) => {
                if let Err(e) = self.apply_rate(state, rate) {
                    log::warn!("rx pipeline: rate change rejected: {e}");
                    self.control.emit(PipelineEvent::ConfigRejected(e.to_string()));
                }
                true
            }
        }
    }

    /// Install `config`. Everything is built on the side first, so a
    /// failure leaves the running state untouched.
    fn apply_settings(
        &self,
        state: &mut RxState,
        config: PipelineConfig,
        force: bool,
    ) -> PipelineResult<()> {
        config.validate()?;
        let decimation_changed = config.log2_decim != state.config.log2_decim;

        if decimation_changed || force || config.channelization_differs(&state.config) {
            let baseband = baseband_rate(state.device_rate, config.log2_decim)?;
            let cascade = if decimation_changed {
                Some(DecimationCascade::new(state.cascade.format(), config.log2_decim)?)
            } else {
                None
            };
            let mut channelizer = Channelizer::new();
            channelizer.set_baseband_sample_rate(baseband);
            let info =
                channelizer.set_channelization(config.channel_rate(), config.frequency_offset)?;

            match cascade {
                Some(cascade) => {
                    state.cascade = cascade;
                    state.ring.resize(SampleRing::size_policy(baseband));
                }
                None if force => state.cascade.reset(),
                None => {}
            }
            state.channelizer = channelizer;
            state.sink.apply_channel(info);
            self.control.emit(PipelineEvent::ChannelChanged(info));
        }

        state.sink.apply_settings(&config, force);
        state.config = config;
        Ok(())
    }

    fn apply_rate(&self, state: &mut RxState, device_rate: u32) -> PipelineResult<()> {
        let baseband = baseband_rate(device_rate, state.config.log2_decim)?;
        state.device_rate = device_rate;
        state.ring.resize(SampleRing::size_policy(baseband));
        state.cascade.reset();
        state.channelizer.set_baseband_sample_rate(baseband);
        if let Err(e) = state
            .channelizer
            .set_channelization(state.config.channel_rate(), state.config.frequency_offset)
        {
            log::warn!("rx pipeline: {e}; keeping fallback channelization");
        }
        let info = state.channelizer.info();
        log::info!(
            "rx pipeline: device rate {} Hz, channel {} Hz at {} Hz",
            device_rate,
            info.channel_rate,
            info.frequency_offset
        );
        state.sink.apply_channel(info);
        self.control.emit(PipelineEvent::ChannelChanged(info));
        Ok(())
    }

    fn process_region(state: &mut RxState, region: Range<usize>) {
        let RxState {
            ring,
            channelizer,
            meter,
            sink,
            batch,
            stats,
            ..
        } = state;

        if channelizer.baseband_sample_rate().is_none() {
            stats.skipped_batches += 1;
            log::warn!("rx pipeline: channelizer not configured, batch skipped");
            return;
        }
        batch.clear();
        channelizer.push(&ring.data()[region], batch);
        if !batch.is_empty() {
            meter.accumulate(batch);
            sink.feed(batch);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Baseband for RxBaseband {
    fn name(&self) -> &'static str {
        "rx"
    }

    fn signals(&self) -> (Sender<WorkerSignal>, Receiver<WorkerSignal>) {
        self.control.signals()
    }

    /// Messages first, then data until the ring is empty or a new message
    /// shows up, then one level notification for the whole cycle.
    fn handle_data(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        self.dispatch_pending(state);

        while state.ring.available() > 0 && self.control.messages.is_empty() {
            let (first, second) = state.ring.read(DRAIN_CHUNK);
            for region in [first, second] {
                if !region.is_empty() {
                    Self::process_region(state, region);
                }
            }
        }

        let report = state.meter.take();
        if report.samples > 0 {
            state.sink.levels(report);
            self.control.emit(PipelineEvent::Levels(report));
        }
    }
}

/// Producer-side handle of a receive pipeline
#[derive(Clone)]
pub struct RxProducer {
    baseband: Arc<RxBaseband>,
}

impl RxProducer {
    /// Copy complex samples into the ring; returns how many were accepted.
    /// The rest are dropped.
    pub fn write(&self, samples: &[Sample]) -> usize {
        let written = {
            let mut state = self.baseband.lock_state();
            let written = state.ring.write_from(samples);
            Self::count_dropped(&mut state.stats, samples.len() - written);
            written
        };
        self.baseband.control.wake(WorkerSignal::DataReady(written));
        written
    }

    /// Decode and decimate raw device bytes, then write the result.
    /// Returns how many decimated samples were accepted.
    pub fn write_raw(&self, raw: &[u8]) -> usize {
        let written = {
            let mut guard = self.baseband.lock_state();
            let RxState {
                cascade,
                staging,
                ring,
                stats,
                ..
            } = &mut *guard;
            staging.clear();
            cascade.decimate(raw, staging);
            let written = ring.write_from(staging);
            Self::count_dropped(stats, staging.len() - written);
            written
        };
        self.baseband.control.wake(WorkerSignal::DataReady(written));
        written
    }

    /// Free slots in the ring, in samples after decimation
    pub fn remainder(&self) -> usize {
        self.baseband.lock_state().ring.remainder()
    }

    /// Ring size in samples
    pub fn capacity(&self) -> usize {
        self.baseband.lock_state().ring.capacity()
    }

    /// Hardware-edge decimation factor currently installed
    pub fn decimation(&self) -> u32 {
        self.baseband.lock_state().cascade.factor()
    }

    fn count_dropped(stats: &mut PipelineStats, dropped: usize) {
        if dropped > 0 {
            stats.dropped_samples += dropped as u64;
            log::trace!("rx pipeline: ring full, dropped {dropped} samples");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_consumer::RecordingSink;
    use crate::domain::SampleFormat;

    fn params(rate: i64) -> PipelineParams {
        PipelineParams::new(rate, SampleFormat::S16Le)
    }

    fn config(bandwidth: u32, oversampling: u32, offset: i64) -> PipelineConfig {
        PipelineConfig {
            frequency_offset: offset,
            channel_bandwidth: bandwidth,
            oversampling,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_non_positive_rate_is_fatal() {
        let (sink, _) = RecordingSink::new();
        assert!(RxBaseband::new(params(0), PipelineConfig::default(), Box::new(sink)).is_err());
        let (sink, _) = RecordingSink::new();
        assert!(RxBaseband::new(params(-1), PipelineConfig::default(), Box::new(sink)).is_err());
    }

    #[test]
    fn test_producer_drops_newest_on_overrun() {
        let (sink, _) = RecordingSink::new();
        let rx = RxBaseband::new(params(48_000), config(12_000, 4, 0), Box::new(sink)).unwrap();
        let producer = rx.producer();
        let capacity = producer.remainder();

        let samples = vec![Sample::new(0.1, 0.0); capacity + 100];
        assert_eq!(producer.write(&samples), capacity);
        assert_eq!(producer.remainder(), 0);
        assert_eq!(rx.stats().dropped_samples, 100);
    }

    #[test]
    fn test_rejected_config_keeps_previous_channel() {
        let (sink, _) = RecordingSink::new();
        let rx = RxBaseband::new(params(96_000), config(12_000, 4, 0), Box::new(sink)).unwrap();
        let events = rx.events();

        // 7 kHz × 1 does not divide 96 kHz into a supported factor
        rx.push_message(ConfigMessage::ApplyConfig {
            config: config(7_000, 1, 0),
            force: false,
        });
        rx.handle_input_messages();

        assert_eq!(rx.channel_info().channel_rate, 48_000);
        assert_eq!(rx.config().channel_bandwidth, 12_000);
        assert!(events
            .try_iter()
            .any(|e| matches!(e, PipelineEvent::ConfigRejected(_))));
    }

    #[test]
    fn test_configure_validates_synchronously() {
        let (sink, _) = RecordingSink::new();
        let rx = RxBaseband::new(params(96_000), config(12_000, 4, 0), Box::new(sink)).unwrap();
        assert!(rx.configure(config(7_000, 1, 0), false).is_err());
        assert!(rx.configure(config(8_000, 4, 500), false).is_ok());
        rx.handle_input_messages();
        assert_eq!(rx.channel_info().channel_rate, 32_000);
        assert_eq!(rx.channel_info().frequency_offset, 500);
    }

    #[test]
    fn test_rate_change_resizes_ring_and_rederives_channel() {
        let (sink, log) = RecordingSink::new();
        let rx = RxBaseband::new(params(96_000), config(12_000, 4, 0), Box::new(sink)).unwrap();
        let producer = rx.producer();
        producer.write(&[Sample::new(1.0, 0.0); 100]);

        rx.push_message(ConfigMessage::RateChanged(192_000));
        rx.handle_data();

        // Pending samples were discarded with the old ring
        assert_eq!(log.fed_samples(), 0);
        assert_eq!(producer.remainder(), SampleRing::size_policy(192_000));
        let info = rx.channel_info();
        assert_eq!(info.baseband_rate, 192_000);
        assert_eq!(info.channel_rate, 48_000);
    }

    #[test]
    fn test_hardware_decimation_change_updates_baseband() {
        let (sink, _) = RecordingSink::new();
        let rx = RxBaseband::new(params(192_000), config(12_000, 4, 0), Box::new(sink)).unwrap();
        rx.push_message(ConfigMessage::ApplyConfig {
            config: PipelineConfig {
                log2_decim: 1,
                ..config(12_000, 4, 0)
            },
            force: false,
        });
        rx.handle_input_messages();

        assert_eq!(rx.channel_info().baseband_rate, 96_000);
        assert_eq!(rx.producer().decimation(), 2);
    }

    #[test]
    fn test_raw_write_goes_through_cascade() {
        let (sink, log) = RecordingSink::new();
        let cfg = PipelineConfig {
            log2_decim: 2,
            ..config(12_000, 4, 0)
        };
        let rx = RxBaseband::new(params(192_000), cfg, Box::new(sink)).unwrap();
        let producer = rx.producer();

        // 4 bytes per S16 sample, 4:1 decimation
        let written = producer.write_raw(&vec![0u8; 4 * 400]);
        assert_eq!(written, 100);
        rx.handle_data();
        assert_eq!(log.fed_samples(), 100);
    }

    #[test]
    fn test_unhandled_payload_reported() {
        let (sink, _) = RecordingSink::rejecting_payloads();
        let rx = RxBaseband::new(params(48_000), config(12_000, 4, 0), Box::new(sink)).unwrap();
        let events = rx.events();
        rx.push_message(ConfigMessage::SetPayload(vec![1, 2, 3]));
        rx.handle_data();
        assert!(events
            .try_iter()
            .any(|e| e == PipelineEvent::Unhandled("SetPayload")));
    }
}
