//! FIR filter implementation

use crate::domain::Sample;

/// Real-tap FIR filter over complex samples.
///
/// `push` and `output` are split so a decimator can feed M inputs and
/// evaluate the taps once.
#[derive(Clone)]
pub struct FirFilter {
    coefficients: Vec<f32>,
    delay_line: Vec<Sample>,
    position: usize,
}

impl FirFilter {
    /// Create a new FIR filter with the given coefficients
    pub fn new(coefficients: Vec<f32>) -> Self {
        let len = coefficients.len().max(1);
        Self {
            coefficients,
            delay_line: vec![Sample::new(0.0, 0.0); len],
            position: 0,
        }
    }

    /// Create a lowpass filter using a Hanning-windowed sinc
    pub fn lowpass(cutoff_freq: f32, sample_rate: f32, num_taps: usize) -> Self {
        let normalized_cutoff = cutoff_freq / sample_rate;
        let mut coefficients = vec![0.0; num_taps];
        let middle = num_taps / 2;

        for (i, coefficient) in coefficients.iter_mut().enumerate() {
            let n = i as f32 - middle as f32;
            *coefficient = if n == 0.0 {
                2.0 * normalized_cutoff
            } else {
                (2.0 * std::f32::consts::PI * normalized_cutoff * n).sin()
                    / (std::f32::consts::PI * n)
            };

            // Symmetric Hanning window so the filter stays linear phase
            let window = 0.5
                * (1.0 - (2.0 * std::f32::consts::PI * (i as f32 + 1.0) / (num_taps as f32 + 1.0)).cos());
            *coefficient *= window;
        }

        // Normalize
        let sum: f32 = coefficients.iter().sum();
        for c in &mut coefficients {
            *c /= sum;
        }

        Self::new(coefficients)
    }

    /// Shift a sample into the delay line without computing an output
    pub fn push(&mut self, sample: Sample) {
        self.delay_line[self.position] = sample;
        self.position = (self.position + 1) % self.delay_line.len();
    }

    /// Evaluate the taps against the current delay line
    pub fn output(&self) -> Sample {
        let len = self.delay_line.len();
        let newest = self.position + len - 1;
        let mut output = Sample::new(0.0, 0.0);
        for (i, &c) in self.coefficients.iter().enumerate() {
            output += self.delay_line[(newest - i) % len] * c;
        }
        output
    }

    /// Process a single sample through the filter
    pub fn process(&mut self, sample: Sample) -> Sample {
        self.push(sample);
        self.output()
    }

    /// Reset the filter state
    pub fn reset(&mut self) {
        self.delay_line.fill(Sample::new(0.0, 0.0));
        self.position = 0;
    }

    pub fn num_taps(&self) -> usize {
        self.coefficients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, rate: f32, i: usize) -> Sample {
        let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / rate;
        Sample::new(phase.cos(), phase.sin())
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = FirFilter::lowpass(1000.0, 48000.0, 63);

        // Feed DC (constant 1.0) through the filter — should converge to ~1.0
        let mut output = Sample::new(0.0, 0.0);
        for _ in 0..200 {
            output = filter.process(Sample::new(1.0, 0.0));
        }

        assert!(
            (output.re - 1.0).abs() < 0.01,
            "DC signal should pass through lowpass unchanged, got {}",
            output
        );
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        // Lowpass at 100 Hz, feed a 10 kHz tone — should be heavily attenuated
        let mut filter = FirFilter::lowpass(100.0, 48000.0, 63);

        let mut max_output = 0.0f32;
        for i in 0..1000 {
            let out = filter.process(tone(10_000.0, 48_000.0, i));
            if i > 100 {
                // Skip transient
                max_output = max_output.max(out.norm());
            }
        }

        assert!(
            max_output < 0.05,
            "10 kHz signal should be attenuated by lowpass at 100 Hz, got {}",
            max_output
        );
    }

    #[test]
    fn test_lowpass_coefficients_normalized() {
        let filter = FirFilter::lowpass(1000.0, 48000.0, 63);
        // Coefficients should sum to ~1.0 (unity DC gain)
        let sum: f32 = filter.coefficients.iter().sum();
        assert!(
            (sum - 1.0).abs() < 0.01,
            "Coefficients should sum to ~1.0, got {}",
            sum
        );
    }

    #[test]
    fn test_push_then_output_matches_process() {
        let mut a = FirFilter::lowpass(2000.0, 48000.0, 31);
        let mut b = a.clone();
        for i in 0..50 {
            let s = tone(700.0, 48_000.0, i);
            let expected = a.process(s);
            b.push(s);
            assert_eq!(b.output(), expected);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = FirFilter::lowpass(1000.0, 48000.0, 63);

        // Feed some samples
        for _ in 0..100 {
            filter.process(Sample::new(1.0, 1.0));
        }

        filter.reset();

        // After reset, processing 0.0 should give 0.0
        let out = filter.process(Sample::new(0.0, 0.0));
        assert_eq!(out, Sample::new(0.0, 0.0));
    }
}
