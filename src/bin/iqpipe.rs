//! iqpipe: run a receive pipeline over a raw I/Q file or a UDP frame stream
//!
//!   RUST_LOG=iqpipe_lib=debug iqpipe --file capture.raw --rate 960000 --offset 5000

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;

use iqpipe_lib::adapters::{FileSource, UdpFrameSource};
use iqpipe_lib::domain::{
    ChannelInfo, PipelineConfig, PipelineError, PipelineParams, PipelineResult, Sample,
    SampleFormat,
};
use iqpipe_lib::dsp::SpectrumAnalyzer;
use iqpipe_lib::pipeline::{PipelineEvent, RxBaseband};
use iqpipe_lib::ports::{ChannelSink, IqSource};

const DRAIN_WAIT_POLLS: usize = 200;

#[derive(Parser, Debug)]
#[clap(version, about = "Channelize a stream of I/Q samples")]
struct Args {
    /// Replay raw interleaved samples from this file
    #[clap(short, long, conflicts_with = "udp")]
    file: Option<PathBuf>,

    /// Listen for metadata-framed datagrams on this address
    #[clap(short, long)]
    udp: Option<String>,

    /// Device (or stream) sample rate in Hz
    #[clap(short, long, default_value_t = 960_000)]
    rate: i64,

    /// Raw component encoding: s8, s16le, u8, u16le
    #[clap(long, default_value = "s16le", value_parser = parse_format)]
    format: SampleFormat,

    /// JSON file holding a PipelineConfig
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Channel offset in Hz, overrides the config file
    #[clap(long, allow_hyphen_values = true)]
    offset: Option<i64>,

    /// Channel bandwidth in Hz, overrides the config file
    #[clap(long)]
    bandwidth: Option<u32>,

    /// log2 of the hardware-edge decimation, overrides the config file
    #[clap(long)]
    log2_decim: Option<u32>,

    /// Network block size, must match the sender
    #[clap(long, default_value_t = 512)]
    block_size: u16,

    /// Stop after this many seconds (UDP only runs until stopped otherwise)
    #[clap(long)]
    duration: Option<u64>,
}

fn parse_format(s: &str) -> Result<SampleFormat, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown sample format '{s}'"))
}

/// Demodulator stand-in: logs the strongest tone in each second of channel
struct PeakLogger {
    analyzer: SpectrumAnalyzer,
    channel_rate: u32,
    pending: Vec<Sample>,
}

impl PeakLogger {
    fn new() -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(4096),
            channel_rate: 0,
            pending: Vec::new(),
        }
    }
}

impl ChannelSink for PeakLogger {
    fn feed(&mut self, samples: &[Sample]) {
        self.pending.extend_from_slice(samples);
        if self.channel_rate > 0 && self.pending.len() >= self.channel_rate as usize {
            let peak = self
                .analyzer
                .peak_frequency(&self.pending, self.channel_rate as f64);
            log::info!("channel peak at {peak:+.1} Hz");
            self.pending.clear();
        }
    }

    fn apply_channel(&mut self, info: ChannelInfo) {
        self.channel_rate = info.channel_rate;
        self.pending.clear();
    }
}

fn load_config(args: &Args) -> PipelineResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| PipelineError::Config(e.to_string()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(offset) = args.offset {
        config.frequency_offset = offset;
    }
    if let Some(bandwidth) = args.bandwidth {
        config.channel_bandwidth = bandwidth;
    }
    if let Some(log2) = args.log2_decim {
        config.log2_decim = log2;
    }
    Ok(config)
}

fn run(args: Args) -> PipelineResult<()> {
    let config = load_config(&args)?;
    log::info!("configuration: {}", serde_json::to_string(&config).unwrap_or_default());

    let mut source: Box<dyn IqSource> = match (&args.file, &args.udp) {
        (Some(path), _) => Box::new(FileSource::new(path, args.format)),
        (None, Some(addr)) => Box::new(UdpFrameSource::bind(addr.as_str(), args.block_size)?),
        (None, None) => {
            return Err(PipelineError::Config("one of --file or --udp is required".into()))
        }
    };

    let rx = RxBaseband::new(
        PipelineParams::new(args.rate, args.format),
        config,
        Box::new(PeakLogger::new()),
    )?;
    let mut worker = rx.spawn_worker()?;

    let events = rx.events();
    let reporter = thread::spawn(move || {
        for event in events.iter() {
            match event {
                PipelineEvent::Levels(report) => log::debug!(
                    "level rms {:.4} peak {:.4} over {} samples",
                    report.rms,
                    report.peak,
                    report.samples
                ),
                other => log::info!("{other:?}"),
            }
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    if let Some(seconds) = args.duration {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            running.store(false, Ordering::Relaxed);
        });
    }

    let offered = source.run(rx.producer(), running)?;
    // Give the worker a moment to drain what is left before stopping it
    let producer = rx.producer();
    for _ in 0..DRAIN_WAIT_POLLS {
        if producer.remainder() == producer.capacity() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    drop(producer);
    worker.stop();
    rx.reset();

    let stats = rx.stats();
    log::info!(
        "{}: {offered} samples offered, {} dropped",
        source.describe(),
        stats.dropped_samples
    );
    drop(rx);
    let _ = reporter.join();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Args::parse()) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
