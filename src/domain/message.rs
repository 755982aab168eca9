//! Messages carried by the configuration channel

use super::PipelineConfig;

/// Command or notification queued for the pipeline worker
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigMessage {
    /// Install a new configuration; `force` reinstalls the channelizer even
    /// when the channel parameters are unchanged
    ApplyConfig { config: PipelineConfig, force: bool },
    /// Opaque payload forwarded verbatim to the consumer
    SetPayload(Vec<u8>),
    /// Upstream device rate changed, in Hz
    RateChanged(u32),
}

impl ConfigMessage {
    /// Short name used in logs and `Unhandled` reports
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigMessage::ApplyConfig { .. } => "ApplyConfig",
            ConfigMessage::SetPayload(_) => "SetPayload",
            ConfigMessage::RateChanged(_) => "RateChanged",
        }
    }
}
