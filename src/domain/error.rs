//! Domain error types

use thiserror::Error;

/// Errors raised while parsing or accepting network frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("record too short: {actual} bytes, need {expected}")]
    TooShort { expected: usize, actual: usize },

    #[error("header checksum mismatch: computed {computed:#018x}, carried {carried:#018x}")]
    HeaderChecksum { computed: u64, carried: u64 },

    #[error("block size mismatch: configured {configured}, declared {declared}")]
    BlockSize { configured: u16, declared: u16 },

    #[error("frame declares no payload")]
    EmptyFrame,

    #[error("compressed payload of {declared} bytes outside 1..={bound}")]
    CompressedSize { declared: u32, bound: usize },

    #[error("unsupported sample width: {0} bytes per component")]
    SampleWidth(u8),

    #[error("payload received while not synchronized")]
    NotSynced,
}

/// Errors that can occur in the sample pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(i64),

    #[error("Unsupported decimation factor: {0}")]
    UnsupportedDecimation(u32),

    #[error("Unsupported ratio: channel rate {channel} does not divide baseband rate {baseband}")]
    UnsupportedRatio { baseband: u32, channel: u32 },

    #[error("Baseband sample rate not set")]
    BasebandRateUnknown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
