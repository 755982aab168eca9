//! Network transport of sample frames
//!
//! A sender emits one metadata datagram per frame followed by the payload,
//! optionally LZ4 compressed. `FrameBuffer` turns that datagram stream back
//! into raw sample bytes.

pub mod buffer;
pub mod meta;

pub use buffer::{Datagram, FrameBuffer, FrameStats, STATS_WINDOW};
pub use meta::{payload_checksum, FrameMetadata, META_LEN, META_WIRE_LEN};
