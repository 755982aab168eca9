//! Pipeline configuration
//!
//! `PipelineConfig` is an immutable snapshot. The worker replaces its current
//! copy wholesale; fields are never patched in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{PipelineError, PipelineResult, SampleFormat};

/// Largest log2 factor accepted by the hardware-edge decimation cascade
pub const MAX_LOG2_DECIM: u32 = 6;

/// Operating parameters that may change while the pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Channel center relative to the baseband center, in Hz
    pub frequency_offset: i64,
    /// Occupied channel bandwidth in Hz
    pub channel_bandwidth: u32,
    /// Channel rate = bandwidth × oversampling
    pub oversampling: u32,
    /// log2 of the decimation applied at the hardware edge
    pub log2_decim: u32,
    /// Modem specific parameters, passed through to the consumer untouched
    #[serde(default)]
    pub modem: BTreeMap<String, f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frequency_offset: 0,
            channel_bandwidth: 12_000,
            oversampling: 4,
            log2_decim: 0,
            modem: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Requested channel sample rate in Hz
    pub fn channel_rate(&self) -> u32 {
        self.channel_bandwidth.saturating_mul(self.oversampling)
    }

    /// True when `other` needs the channelizer to be reinstalled
    pub fn channelization_differs(&self, other: &PipelineConfig) -> bool {
        self.frequency_offset != other.frequency_offset
            || self.channel_bandwidth != other.channel_bandwidth
            || self.oversampling != other.oversampling
    }

    /// Structural checks that do not depend on the current baseband rate
    pub fn validate(&self) -> PipelineResult<()> {
        if self.channel_bandwidth == 0 {
            return Err(PipelineError::Config("channel bandwidth must be positive".into()));
        }
        if self.oversampling == 0 {
            return Err(PipelineError::Config("oversampling must be positive".into()));
        }
        if self.log2_decim > MAX_LOG2_DECIM {
            return Err(PipelineError::UnsupportedDecimation(1 << self.log2_decim.min(31)));
        }
        Ok(())
    }
}

/// Construction-time parameters of a pipeline instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Native device (or network stream) sample rate in Hz
    pub sample_rate: i64,
    /// Encoding of raw bytes handed to `write_raw`
    pub format: SampleFormat,
}

impl PipelineParams {
    pub fn new(sample_rate: i64, format: SampleFormat) -> Self {
        Self { sample_rate, format }
    }

    /// Checked conversion of the declared rate
    pub fn checked_rate(&self) -> PipelineResult<u32> {
        if self.sample_rate <= 0 || self.sample_rate > u32::MAX as i64 {
            return Err(PipelineError::InvalidSampleRate(self.sample_rate));
        }
        Ok(self.sample_rate as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel_rate(), 48_000);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = PipelineConfig::default();
        config.modem.insert("spread_factor".into(), 7.0);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"oversampling\":4"));
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn modem_parameters_do_not_affect_channelization() {
        let a = PipelineConfig::default();
        let mut b = a.clone();
        b.modem.insert("gain".into(), 3.0);
        assert!(!a.channelization_differs(&b));
        b.frequency_offset = 100;
        assert!(a.channelization_differs(&b));
    }

    #[test]
    fn validate_rejects_large_decimation() {
        let config = PipelineConfig {
            log2_decim: 7,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::UnsupportedDecimation(128))
        ));
    }

    #[test]
    fn params_reject_non_positive_rate() {
        assert!(PipelineParams::new(0, SampleFormat::S16Le).checked_rate().is_err());
        assert!(PipelineParams::new(-48_000, SampleFormat::S16Le).checked_rate().is_err());
        assert_eq!(
            PipelineParams::new(48_000, SampleFormat::S16Le).checked_rate().unwrap(),
            48_000
        );
    }
}
