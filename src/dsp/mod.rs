//! Digital Signal Processing
//!
//! Pure signal processing, no I/O and no locking.

pub mod channelizer;
pub mod filter;
pub mod halfband;
pub mod level;
pub mod nco;
pub mod ring;
pub mod spectrum;

// Re-export commonly used items
pub use channelizer::Channelizer;
pub use halfband::{DecimationCascade, HalfBand};
pub use level::LevelMeter;
pub use nco::Nco;
pub use ring::SampleRing;
pub use spectrum::SpectrumAnalyzer;
