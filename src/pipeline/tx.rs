//! Transmit baseband: modulator → channelizer (up) → ring → device reader
//!
//! The worker keeps the ring topped up; the device side drains it with
//! `pull`. When the ring runs dry the device gets zeros and the shortfall
//! is counted as underrun.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender};

use crate::domain::{
    ChannelInfo, ConfigMessage, PipelineConfig, PipelineError, PipelineParams, PipelineResult,
    PipelineStats, Sample,
};
use crate::dsp::{Channelizer, LevelMeter, SampleRing};
use crate::ports::ChannelSource;

use super::worker::{Baseband, PipelineWorker, WorkerSignal};
use super::{baseband_rate, Control, PipelineEvent, DRAIN_CHUNK};

struct TxState {
    config: PipelineConfig,
    device_rate: u32,
    ring: SampleRing,
    channelizer: Channelizer,
    meter: LevelMeter,
    source: Box<dyn ChannelSource>,
    stats: PipelineStats,
}

/// Transmit side of a pipeline instance
pub struct TxBaseband {
    state: Mutex<TxState>,
    control: Control,
}

fn check_decimation(config: &PipelineConfig) -> PipelineResult<()> {
    if config.log2_decim != 0 {
        return Err(PipelineError::Config(
            "hardware-edge decimation is receive only".into(),
        ));
    }
    Ok(())
}

impl TxBaseband {
    pub fn new(
        params: PipelineParams,
        config: PipelineConfig,
        mut source: Box<dyn ChannelSource>,
    ) -> PipelineResult<Arc<Self>> {
        let device_rate = params.checked_rate()?;
        config.validate()?;
        check_decimation(&config)?;
        let baseband = baseband_rate(device_rate, 0)?;

        let mut channelizer = Channelizer::new();
        channelizer.set_baseband_sample_rate(baseband);
        let info = channelizer.set_channelization(config.channel_rate(), config.frequency_offset)?;

        source.apply_channel(info);
        source.apply_settings(&config, true);
        log::info!(
            "tx pipeline: channel {} Hz -> baseband {} Hz",
            info.channel_rate,
            baseband
        );

        Ok(Arc::new(Self {
            state: Mutex::new(TxState {
                config,
                device_rate,
                ring: SampleRing::new(SampleRing::size_policy(baseband)),
                channelizer,
                meter: LevelMeter::new(),
                source,
                stats: PipelineStats::default(),
            }),
            control: Control::new(),
        }))
    }

    pub fn spawn_worker(self: &Arc<Self>) -> PipelineResult<PipelineWorker> {
        PipelineWorker::spawn(Arc::clone(self))
    }

    pub fn push_message(&self, message: ConfigMessage) {
        self.control.messages.push(message);
    }

    /// Check `config` against the current rate, then queue it
    pub fn configure(&self, config: PipelineConfig, force: bool) -> PipelineResult<()> {
        config.validate()?;
        check_decimation(&config)?;
        let baseband = baseband_rate(self.lock_state().device_rate, 0)?;
        Channelizer::supports(baseband, config.channel_rate())?;
        self.push_message(ConfigMessage::ApplyConfig { config, force });
        Ok(())
    }

    /// Copy baseband samples out for the device.
    ///
    /// Always fills `out`; the part the ring could not supply is zeroed.
    /// Returns how many real samples were delivered.
    pub fn pull(&self, out: &mut [Sample]) -> usize {
        let delivered = {
            let mut state = self.lock_state();
            let delivered = state.ring.read_into(out);
            let missing = out.len() - delivered;
            if missing > 0 {
                out[delivered..].fill(Sample::new(0.0, 0.0));
                state.stats.underrun_samples += missing as u64;
                log::trace!("tx pipeline: underrun of {missing} samples");
            }
            delivered
        };
        self.control.wake(WorkerSignal::DataReady(out.len()));
        delivered
    }

    /// Samples ready for the device
    pub fn available(&self) -> usize {
        self.lock_state().ring.available()
    }

    pub fn channel_info(&self) -> ChannelInfo {
        self.lock_state().channelizer.info()
    }

    pub fn config(&self) -> PipelineConfig {
        self.lock_state().config.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock_state().stats
    }

    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.control.events_rx.clone()
    }

    /// Only call once the device reader is stopped and the worker joined
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.ring.reset();
        state.channelizer.reset();
    }

    pub fn handle_input_messages(&self) {
        let mut state = self.lock_state();
        self.dispatch_pending(&mut state);
    }

    fn dispatch_pending(&self, state: &mut TxState) {
        for message in self.control.messages.pop_all() {
            let kind = message.kind();
            if !self.handle_message(state, message) {
                log::warn!("tx pipeline: unhandled message {kind}");
                self.control.emit(PipelineEvent::Unhandled(kind));
            }
        }
    }

    fn handle_message(&self, state: &mut TxState, message: ConfigMessage) -> bool {
        let result = match message {
            ConfigMessage::ApplyConfig { config, force } => self.apply_settings(state, config, force),
            ConfigMessage::SetPayload(payload) => {
                log::debug!("tx pipeline: payload of {} bytes", payload.len());
                return state.source.set_payload(&payload);
            }
            ConfigMessage::RateChanged(rate) => self.apply_rate(state, rate),
        };
        if let Err(e) = result {
            log::warn!("tx pipeline: {e}");
            self.control.emit(PipelineEvent::ConfigRejected(e.to_string()));
        }
        true
    }

    fn apply_settings(
        &self,
        state: &mut TxState,
        config: PipelineConfig,
        force: bool,
    ) -> PipelineResult<()> {
        config.validate()?;
        check_decimation(&config)?;

        if force || config.channelization_differs(&state.config) {
            let mut channelizer = Channelizer::new();
            channelizer.set_baseband_sample_rate(state.device_rate);
            let info =
                channelizer.set_channelization(config.channel_rate(), config.frequency_offset)?;
            state.channelizer = channelizer;
            state.source.apply_channel(info);
            self.control.emit(PipelineEvent::ChannelChanged(info));
        }

        state.source.apply_settings(&config, force);
        state.config = config;
        Ok(())
    }

    fn apply_rate(&self, state: &mut TxState, device_rate: u32) -> PipelineResult<()> {
        let baseband = baseband_rate(device_rate, 0)?;
        state.device_rate = device_rate;
        state.ring.resize(SampleRing::size_policy(baseband));
        state.channelizer.set_baseband_sample_rate(baseband);
        if let Err(e) = state
            .channelizer
            .set_channelization(state.config.channel_rate(), state.config.frequency_offset)
        {
            log::warn!("tx pipeline: {e}; keeping fallback channelization");
        }
        let info = state.channelizer.info();
        state.source.apply_channel(info);
        self.control.emit(PipelineEvent::ChannelChanged(info));
        Ok(())
    }

    fn fill_region(state: &mut TxState, region: Range<usize>) {
        let TxState {
            ring,
            channelizer,
            meter,
            source,
            ..
        } = state;
        let mut modulator = |buf: &mut [Sample]| {
            source.pull(buf);
            meter.accumulate(buf);
        };
        channelizer.pull(&mut ring.data_mut()[region], &mut modulator);
    }

    fn lock_state(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Baseband for TxBaseband {
    fn name(&self) -> &'static str {
        "tx"
    }

    fn signals(&self) -> (Sender<WorkerSignal>, Receiver<WorkerSignal>) {
        self.control.signals()
    }

    /// Messages first, then top the ring up while no new message arrives
    fn handle_data(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        self.dispatch_pending(state);

        while state.ring.remainder() > 0 && self.control.messages.is_empty() {
            let (first, second) = state.ring.write(DRAIN_CHUNK);
            for region in [first, second] {
                if !region.is_empty() {
                    Self::fill_region(state, region);
                }
            }
        }

        let report = state.meter.take();
        if report.samples > 0 {
            state.source.levels(report);
            self.control.emit(PipelineEvent::Levels(report));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::adapters::mock_consumer::ToneSource;
    use crate::domain::{LevelReport, SampleFormat};

    fn params(rate: i64) -> PipelineParams {
        PipelineParams::new(rate, SampleFormat::S16Le)
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Channel(i64),
        Pull(usize),
        Levels(LevelReport),
    }

    /// Silent modulator that retunes its own pipeline on the first pull
    struct RetuningSource {
        pipeline: Arc<Mutex<Weak<TxBaseband>>>,
        calls: Arc<Mutex<Vec<Call>>>,
        retuned: bool,
    }

    impl ChannelSource for RetuningSource {
        fn pull(&mut self, out: &mut [Sample]) {
            out.fill(Sample::new(0.25, 0.0));
            self.calls.lock().unwrap().push(Call::Pull(out.len()));
            if !self.retuned {
                if let Some(tx) = self.pipeline.lock().unwrap().upgrade() {
                    tx.push_message(ConfigMessage::ApplyConfig {
                        config: PipelineConfig {
                            frequency_offset: -12_000,
                            ..PipelineConfig::default()
                        },
                        force: false,
                    });
                    self.retuned = true;
                }
            }
        }

        fn apply_channel(&mut self, info: ChannelInfo) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Channel(info.frequency_offset));
        }

        fn levels(&mut self, report: LevelReport) {
            self.calls.lock().unwrap().push(Call::Levels(report));
        }
    }

    #[test]
    fn test_refill_yields_to_new_message() {
        let pipeline = Arc::new(Mutex::new(Weak::new()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = RetuningSource {
            pipeline: Arc::clone(&pipeline),
            calls: Arc::clone(&calls),
            retuned: false,
        };
        let tx = TxBaseband::new(params(96_000), PipelineConfig::default(), Box::new(source))
            .unwrap();
        *pipeline.lock().unwrap() = Arc::downgrade(&tx);

        // One chunk goes in, then the queued retune stops the refill
        tx.handle_data();
        let capacity = SampleRing::size_policy(96_000);
        assert_eq!(tx.available(), DRAIN_CHUNK);
        assert!(tx.available() < capacity);

        tx.handle_data();
        assert_eq!(tx.available(), capacity);
        assert_eq!(tx.channel_info().frequency_offset, -12_000);

        let calls = calls.lock().unwrap().clone();
        let retune = calls
            .iter()
            .position(|c| *c == Call::Channel(-12_000))
            .expect("retune not applied");
        let pulls_before = calls[..retune]
            .iter()
            .filter(|c| matches!(c, Call::Pull(_)))
            .count();
        assert_eq!(pulls_before, 1, "only the first chunk precedes the retune");
        assert!(calls[retune..].iter().any(|c| matches!(c, Call::Pull(_))));
    }

    #[test]
    fn test_source_receives_levels() {
        let pipeline = Arc::new(Mutex::new(Weak::new()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = RetuningSource {
            pipeline,
            calls: Arc::clone(&calls),
            retuned: true,
        };
        let tx = TxBaseband::new(params(48_000), PipelineConfig::default(), Box::new(source))
            .unwrap();
        let events = tx.events();
        tx.handle_data();

        let calls = calls.lock().unwrap().clone();
        let Some(Call::Levels(report)) = calls.last().cloned() else {
            panic!("expected a level report last, got {calls:?}");
        };
        assert_eq!(report.samples, SampleRing::size_policy(48_000));
        assert!((report.peak - 0.25).abs() < 1e-6);
        assert!(events
            .try_iter()
            .any(|e| e == PipelineEvent::Levels(report)));
    }

    #[test]
    fn test_hardware_decimation_rejected() {
        let config = PipelineConfig {
            log2_decim: 1,
            ..PipelineConfig::default()
        };
        let source = ToneSource::new(1_000.0);
        assert!(TxBaseband::new(params(96_000), config, Box::new(source)).is_err());
    }

    #[test]
    fn test_pull_zero_fills_on_underrun() {
        let tx = TxBaseband::new(
            params(48_000),
            PipelineConfig::default(),
            Box::new(ToneSource::new(1_000.0)),
        )
        .unwrap();

        let mut out = vec![Sample::new(9.0, 9.0); 256];
        assert_eq!(tx.pull(&mut out), 0);
        assert!(out.iter().all(|s| s.norm() == 0.0));
        assert_eq!(tx.stats().underrun_samples, 256);
    }

    #[test]
    fn test_worker_cycle_fills_ring() {
        let tx = TxBaseband::new(
            params(96_000),
            PipelineConfig::default(),
            Box::new(ToneSource::new(1_000.0)),
        )
        .unwrap();
        let events = tx.events();
        tx.handle_data();

        assert_eq!(tx.available(), SampleRing::size_policy(96_000));
        let mut out = vec![Sample::new(0.0, 0.0); 1024];
        assert_eq!(tx.pull(&mut out), 1024);
        assert_eq!(tx.stats().underrun_samples, 0);
        assert!(events
            .try_iter()
            .any(|e| matches!(e, PipelineEvent::Levels(r) if r.samples > 0)));
    }

    #[test]
    fn test_config_change_moves_channel() {
        let tx = TxBaseband::new(
            params(96_000),
            PipelineConfig::default(),
            Box::new(ToneSource::new(0.0)),
        )
        .unwrap();
        let config = PipelineConfig {
            frequency_offset: -12_000,
            ..PipelineConfig::default()
        };
        tx.configure(config, false).unwrap();
        tx.handle_input_messages();
        assert_eq!(tx.channel_info().frequency_offset, -12_000);
        assert_eq!(tx.config().frequency_offset, -12_000);
    }
}
