//! Half-band filters and the hardware-edge decimation cascade
//!
//! A half-band lowpass has its cutoff at a quarter of the sample rate, so
//! every even tap except the center one is zero. Decimating by two only
//! needs one filter evaluation per pair of inputs; interpolating by two
//! feeds the input followed by a zero.
//!
//! `DecimationCascade` chains `log2` half-band stages behind a raw sample
//! decoder chosen from the device `SampleFormat`.

use std::f32::consts::PI;

use crate::domain::{PipelineError, PipelineResult, Sample, SampleFormat, MAX_LOG2_DECIM};

/// Number of taps, always of the form 4k + 3
pub const HALFBAND_TAPS: usize = 31;

/// Streaming half-band filter for decimation or interpolation by two
#[derive(Clone)]
pub struct HalfBand {
    coefficients: Vec<f32>,
    delay_line: Vec<Sample>,
    position: usize,
    odd: bool,
}

impl HalfBand {
    pub fn new() -> Self {
        let coefficients = design(HALFBAND_TAPS);
        Self {
            delay_line: vec![Sample::new(0.0, 0.0); coefficients.len()],
            coefficients,
            position: 0,
            odd: false,
        }
    }

    /// Push one input; every second call yields an output at half the rate
    pub fn decimate(&mut self, sample: Sample) -> Option<Sample> {
        self.push(sample);
        self.odd = !self.odd;
        if self.odd {
            None
        } else {
            Some(self.output())
        }
    }

    /// Produce two outputs at twice the rate for one input
    pub fn interpolate(&mut self, sample: Sample) -> [Sample; 2] {
        self.push(sample * 2.0);
        let first = self.output();
        self.push(Sample::new(0.0, 0.0));
        let second = self.output();
        [first, second]
    }

    /// Clear the delay line and the decimation phase
    pub fn reset(&mut self) {
        self.delay_line.fill(Sample::new(0.0, 0.0));
        self.position = 0;
        self.odd = false;
    }

    fn push(&mut self, sample: Sample) {
        self.delay_line[self.position] = sample;
        self.position = (self.position + 1) % self.delay_line.len();
    }

    fn output(&self) -> Sample {
        let len = self.delay_line.len();
        let newest = self.position + len - 1;
        let mut acc = Sample::new(0.0, 0.0);
        for (i, &c) in self.coefficients.iter().enumerate() {
            if c == 0.0 {
                continue;
            }
            acc += self.delay_line[(newest - i) % len] * c;
        }
        acc
    }
}

impl Default for HalfBand {
    fn default() -> Self {
        Self::new()
    }
}

/// Blackman-windowed sinc with cutoff at fs/4, normalized to unity DC gain
fn design(num_taps: usize) -> Vec<f32> {
    let middle = num_taps / 2;
    let span = (num_taps - 1) as f32;
    let mut coefficients: Vec<f32> = (0..num_taps)
        .map(|i| {
            let n = i as i32 - middle as i32;
            if n == 0 {
                return 0.5;
            }
            if n % 2 == 0 {
                return 0.0;
            }
            let nf = n as f32;
            let sinc = (PI * nf / 2.0).sin() / (PI * nf);
            let x = i as f32 / span;
            let window = 0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos();
            sinc * window
        })
        .collect();

    // Center tap stays at 0.5; the odd taps share the other half of the gain
    let side: f32 = coefficients
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != middle)
        .map(|(_, c)| c)
        .sum();
    for (i, c) in coefficients.iter_mut().enumerate() {
        if i != middle {
            *c *= 0.5 / side;
        }
    }
    coefficients
}

type ComponentDecoder = fn(&[u8]) -> f32;

fn decode_s8(b: &[u8]) -> f32 {
    b[0] as i8 as f32 / 128.0
}

fn decode_s16le(b: &[u8]) -> f32 {
    i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0
}

fn decode_u8(b: &[u8]) -> f32 {
    (b[0] as f32 - 128.0) / 128.0
}

fn decode_u16le(b: &[u8]) -> f32 {
    (u16::from_le_bytes([b[0], b[1]]) as f32 - 32768.0) / 32768.0
}

/// Raw device bytes in, complex samples at rate / 2^log2 out
pub struct DecimationCascade {
    format: SampleFormat,
    decoder: ComponentDecoder,
    stages: Vec<HalfBand>,
    /// Trailing bytes of an incomplete sample from the previous call
    pending: Vec<u8>,
}

impl DecimationCascade {
    /// Build a cascade of `log2` halving stages for the given input encoding
    pub fn new(format: SampleFormat, log2: u32) -> PipelineResult<Self> {
        if log2 > MAX_LOG2_DECIM {
            return Err(PipelineError::UnsupportedDecimation(1 << log2.min(31)));
        }
        let decoder: ComponentDecoder = match format {
            SampleFormat::S8 => decode_s8,
            SampleFormat::S16Le => decode_s16le,
            SampleFormat::U8 => decode_u8,
            SampleFormat::U16Le => decode_u16le,
        };
        Ok(Self {
            format,
            decoder,
            stages: (0..log2).map(|_| HalfBand::new()).collect(),
            pending: Vec::with_capacity(format.sample_bytes()),
        })
    }

    /// Build from a plain decimation factor, which must be a power of two
    pub fn with_factor(format: SampleFormat, factor: u32) -> PipelineResult<Self> {
        if !factor.is_power_of_two() {
            return Err(PipelineError::UnsupportedDecimation(factor));
        }
        Self::new(format, factor.trailing_zeros())
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn log2(&self) -> u32 {
        self.stages.len() as u32
    }

    pub fn factor(&self) -> u32 {
        1 << self.log2()
    }

    /// Decode `raw` and append the decimated samples to `out`.
    /// Returns the number of samples appended.
    pub fn decimate(&mut self, raw: &[u8], out: &mut Vec<Sample>) -> usize {
        let width = self.format.sample_bytes();
        let before = out.len();
        let mut raw = raw;

        if !self.pending.is_empty() {
            let need = (width - self.pending.len()).min(raw.len());
            self.pending.extend_from_slice(&raw[..need]);
            raw = &raw[need..];
            if self.pending.len() < width {
                return 0;
            }
            let bytes = std::mem::take(&mut self.pending);
            self.feed(&bytes, out);
            self.pending = bytes;
            self.pending.clear();
        }

        let whole = raw.len() - raw.len() % width;
        for chunk in raw[..whole].chunks_exact(width) {
            self.feed(chunk, out);
        }
        self.pending.extend_from_slice(&raw[whole..]);

        out.len() - before
    }

    /// Clear every stage and any partial sample
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        self.pending.clear();
    }

    fn feed(&mut self, bytes: &[u8], out: &mut Vec<Sample>) {
        let half = bytes.len() / 2;
        let mut value = Some(Sample::new(
            (self.decoder)(&bytes[..half]),
            (self.decoder)(&bytes[half..]),
        ));
        for stage in &mut self.stages {
            value = match value {
                Some(v) => stage.decimate(v),
                None => break,
            };
        }
        if let Some(v) = value {
            out.push(v);
        }
    }
}
