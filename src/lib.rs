//! Streaming I/Q sample pipeline
//!
//! Carries a continuous stream of complex samples from a radio front-end or
//! a network link to a demodulator (or from a modulator back out), carving a
//! narrow channel out of the wideband stream on the way. Operating
//! parameters change asynchronously without interrupting the data path.
//!
//! ## Architecture (Hexagonal / Ports & Adapters)
//!
//! - `domain/` - Pure domain types, no I/O dependencies
//! - `ports/` - Trait definitions for the modem and sample producers
//! - `dsp/` - Signal processing (ring buffer, filters, channelizer)
//! - `pipeline/` - Rx/Tx basebands, config channel and worker thread
//! - `network/` - Frame metadata, checksums and LZ4 reassembly
//! - `adapters/` - Implementations of ports (file replay, UDP, mocks)

// Core domain (pure, no I/O)
pub mod domain;
pub mod dsp;
pub mod ports;

// Streaming core
pub mod network;
pub mod pipeline;

// Adapters (external I/O)
pub mod adapters;
