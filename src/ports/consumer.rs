//! Consumer traits: the demodulator or modulator behind a pipeline

use crate::domain::{ChannelInfo, LevelReport, PipelineConfig, Sample};

/// Receives down-converted channel samples (a demodulator)
///
/// Only requires `Send`: the pipeline keeps it behind its own mutex.
pub trait ChannelSink: Send {
    /// One contiguous run of channel samples per drain batch
    fn feed(&mut self, samples: &[Sample]);

    /// Channel rate and achieved offset after a (re)install
    fn apply_channel(&mut self, _info: ChannelInfo) {}

    /// Every accepted configuration, including the modem parameters
    fn apply_settings(&mut self, _config: &PipelineConfig, _force: bool) {}

    /// Opaque payload; return `false` if this consumer has no use for it
    fn set_payload(&mut self, _payload: &[u8]) -> bool {
        false
    }

    /// Level of the channel samples fed during the last drain cycle
    fn levels(&mut self, _report: LevelReport) {}
}

/// Produces channel samples to be up-converted (a modulator)
pub trait ChannelSource: Send {
    /// Fill `out` completely with channel-rate samples
    fn pull(&mut self, out: &mut [Sample]);

    /// Channel rate and achieved offset after a (re)install
    fn apply_channel(&mut self, _info: ChannelInfo) {}

    /// Every accepted configuration, including the modem parameters
    fn apply_settings(&mut self, _config: &PipelineConfig, _force: bool) {}

    /// Opaque payload, e.g. the symbols to transmit
    fn set_payload(&mut self, _payload: &[u8]) -> bool {
        false
    }

    /// Level of the channel samples pulled during the last refill cycle
    fn levels(&mut self, _report: LevelReport) {}
}
