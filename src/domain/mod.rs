//! Core domain types
//!
//! Pure types with no I/O dependencies: samples, configuration snapshots,
//! queued messages and errors.

pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use config::*;
pub use error::*;
pub use message::*;
pub use types::*;
