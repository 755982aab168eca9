//! UDP frame receiver
//!
//! Binds a socket, pushes every datagram through a `FrameBuffer` and hands
//! the decoded samples to an `RxProducer`. Framing errors are logged and
//! skipped; only socket errors end the loop.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{FrameError, PipelineResult};
use crate::network::{FrameBuffer, FrameStats};
use crate::pipeline::RxProducer;
use crate::ports::IqSource;

/// Largest datagram we accept
const MAX_DATAGRAM: usize = 65_536;

/// How often the receive loop checks its stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Samples moved to the producer per call
const SAMPLES_PER_WRITE: usize = 4096;

pub struct UdpFrameSource {
    socket: UdpSocket,
    buffer: FrameBuffer,
}

impl UdpFrameSource {
    pub fn bind(addr: impl ToSocketAddrs, block_size: u16) -> PipelineResult<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        Ok(Self {
            socket,
            buffer: FrameBuffer::new(block_size),
        })
    }

    pub fn local_addr(&self) -> PipelineResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> FrameStats {
        self.buffer.stats()
    }

    /// Move decoded samples to the producer, never more than the ring has
    /// room for. The rest waits in the frame buffer. Returns how many were
    /// offered.
    fn forward(&mut self, producer: &RxProducer) -> u64 {
        let mut offered = 0;
        loop {
            let room = producer.remainder();
            if room == 0 {
                break;
            }
            let samples = self.buffer.read_samples(room.min(SAMPLES_PER_WRITE));
            if samples.is_empty() {
                break;
            }
            producer.write(&samples);
            offered += samples.len() as u64;
        }
        offered
    }
}

impl IqSource for UdpFrameSource {
    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp {addr}"),
            Err(_) => "udp (unbound)".to_string(),
        }
    }

    fn run(&mut self, producer: RxProducer, running: Arc<AtomicBool>) -> PipelineResult<u64> {
        let mut datagram = vec![0u8; MAX_DATAGRAM];
        let mut offered = 0;

        log::info!("listening on {}", self.describe());
        while running.load(Ordering::Relaxed) {
            match self.socket.recv(&mut datagram) {
                Ok(len) => match self.buffer.ingest(&datagram[..len]) {
                    Ok(_) => {}
                    Err(FrameError::NotSynced) => log::trace!("payload dropped, not synced"),
                    Err(e) => log::warn!("frame rejected: {e}"),
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => return Err(e.into()),
            }
            // Backlog left by a full ring goes out once the worker frees room
            offered += self.forward(&producer);
        }
        log::info!("receiver stopped after {offered} samples");
        Ok(offered)
    }
}
