//! Port traits (interfaces)
//!
//! These traits define the boundaries between the pipeline core and the
//! external collaborators: the modem on one side, the sample producer on
//! the other. Adapters implement them.

pub mod consumer;
pub mod source;

pub use consumer::*;
pub use source::*;
