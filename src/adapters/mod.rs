//! Adapter implementations of port traits

pub mod file_source;
pub mod mock_consumer;
pub mod udp_source;

pub use file_source::FileSource;
pub use mock_consumer::{RecordingSink, SinkEntry, SinkLog, ToneSource};
pub use udp_source::UdpFrameSource;
