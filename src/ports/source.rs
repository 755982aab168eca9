//! Producer trait: anything that feeds raw or complex samples into a pipeline

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::domain::PipelineResult;
use crate::pipeline::RxProducer;

/// A sample producer running on its own thread until `running` clears
pub trait IqSource: Send {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Pump samples into `producer`; returns the number of samples offered
    fn run(&mut self, producer: RxProducer, running: Arc<AtomicBool>) -> PipelineResult<u64>;
}
