//! Numerically Controlled Oscillator

use std::f64::consts::PI;

use crate::domain::Sample;

/// Numerically Controlled Oscillator used to shift a channel to or from 0 Hz
pub struct Nco {
    phase: f64,
    phase_increment: f64,
    sample_rate: f64,
}

impl Nco {
    /// Create a new NCO with the given frequency and sample rate
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        let phase_increment = 2.0 * PI * frequency / sample_rate;
        Self {
            phase: 0.0,
            phase_increment,
            sample_rate,
        }
    }

    /// Set the oscillator frequency
    pub fn set_frequency(&mut self, frequency: f64) {
        self.phase_increment = 2.0 * PI * frequency / self.sample_rate;
    }

    /// Change the sample rate, keeping the phase increment meaningful
    pub fn set_sample_rate(&mut self, frequency: f64, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.set_frequency(frequency);
    }

    /// Get the current frequency
    pub fn frequency(&self) -> f64 {
        self.phase_increment * self.sample_rate / (2.0 * PI)
    }

    /// Generate the next I/Q sample pair (cos, sin)
    pub fn next_iq(&mut self) -> (f32, f32) {
        let i = self.phase.cos() as f32;
        let q = self.phase.sin() as f32;
        self.advance();
        (i, q)
    }

    /// Multiply a sample by the oscillator, i.e. shift it by `frequency`
    pub fn mix(&mut self, sample: Sample) -> Sample {
        let (i, q) = self.next_iq();
        sample * Sample::new(i, q)
    }

    /// Multiply by the conjugate oscillator, i.e. shift it by `-frequency`
    pub fn mix_down(&mut self, sample: Sample) -> Sample {
        let (i, q) = self.next_iq();
        sample * Sample::new(i, -q)
    }

    /// Reset phase to zero
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn advance(&mut self) {
        self.phase += self.phase_increment;
        while self.phase >= 2.0 * PI {
            self.phase -= 2.0 * PI;
        }
        while self.phase < 0.0 {
            self.phase += 2.0 * PI;
        }
    }
}
