//! Running RMS / peak level measurement

use crate::domain::{LevelReport, Sample};

/// Accumulates magnitude statistics until `take` is called
#[derive(Debug, Default)]
pub struct LevelMeter {
    sum_squares: f64,
    peak: f32,
    samples: usize,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, samples: &[Sample]) {
        for s in samples {
            let power = s.norm_sqr();
            self.sum_squares += power as f64;
            self.peak = self.peak.max(power);
        }
        self.samples += samples.len();
    }

    /// Report the levels since the last call and start over
    pub fn take(&mut self) -> LevelReport {
        let report = if self.samples == 0 {
            LevelReport::default()
        } else {
            LevelReport {
                rms: (self.sum_squares / self.samples as f64).sqrt() as f32,
                peak: self.peak.sqrt(),
                samples: self.samples,
            }
        };
        *self = Self::default();
        report
    }
}
