//! Core domain types

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Complex I/Q sample, components normalized to roughly -1.0..1.0
pub type Sample = Complex32;

/// Encoding of raw interleaved I/Q components coming off a device.
///
/// Unsigned variants are offset-binary: the midpoint of the range is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 8-bit (HackRF style)
    S8,
    /// Signed 16-bit little endian
    S16Le,
    /// Unsigned 8-bit offset binary (RTL-SDR style)
    U8,
    /// Unsigned 16-bit little endian offset binary
    U16Le,
}

impl SampleFormat {
    /// Bytes per single component (I or Q)
    pub fn component_bytes(&self) -> usize {
        match self {
            SampleFormat::S8 | SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::U16Le => 2,
        }
    }

    /// Bytes per complex sample
    pub fn sample_bytes(&self) -> usize {
        2 * self.component_bytes()
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, SampleFormat::S8 | SampleFormat::S16Le)
    }
}

/// Signal level telemetry aggregated over one drain cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelReport {
    /// Root mean square magnitude
    pub rms: f32,
    /// Peak magnitude
    pub peak: f32,
    /// Number of samples measured
    pub samples: usize,
}

/// Channelization actually installed, which may differ from the request
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub baseband_rate: u32,
    pub channel_rate: u32,
    pub frequency_offset: i64,
}

/// Counters for producer overrun and consumer underrun
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Samples discarded because the ring was full
    pub dropped_samples: u64,
    /// Samples zero-filled because the ring was empty
    pub underrun_samples: u64,
    /// Batches the channelizer could not process
    pub skipped_batches: u64,
}
