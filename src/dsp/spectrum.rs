//! FFT spectrum of complex sample blocks, used to locate tones

use std::sync::Arc;

use rustfft::{Fft, FftPlanner};

use crate::domain::Sample;

/// FFT processor over complex samples with a Hanning window
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Create a new analyzer with the given size
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = std::f32::consts::PI * i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * x).cos())
            })
            .collect();

        Self {
            fft,
            fft_size,
            window,
        }
    }

    /// Power per bin in dB, in FFT order (bin 0 is DC, upper half negative)
    pub fn compute(&mut self, samples: &[Sample]) -> Vec<f32> {
        let mut buffer: Vec<Sample> = samples
            .iter()
            .take(self.fft_size)
            .zip(self.window.iter())
            .map(|(&s, &w)| s * w)
            .collect();

        // Pad if necessary
        buffer.resize(self.fft_size, Sample::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer
            .iter()
            .map(|c| 10.0 * c.norm_sqr().max(1e-20).log10())
            .collect()
    }

    /// Signed frequency of the strongest bin
    pub fn peak_frequency(&mut self, samples: &[Sample], sample_rate: f64) -> f64 {
        let spectrum = self.compute(samples);
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let signed_bin = if peak_bin > self.fft_size / 2 {
            peak_bin as f64 - self.fft_size as f64
        } else {
            peak_bin as f64
        };
        signed_bin * self.bin_width(sample_rate)
    }

    /// Frequency resolution at `sample_rate`
    pub fn bin_width(&self, sample_rate: f64) -> f64 {
        sample_rate / self.fft_size as f64
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

/// One-shot peak search over a whole block
pub fn peak_frequency(samples: &[Sample], sample_rate: f64) -> f64 {
    SpectrumAnalyzer::new(samples.len().max(1)).peak_frequency(samples, sample_rate)
}
