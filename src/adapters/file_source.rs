//! Raw I/Q file replay
//!
//! Reads interleaved device samples from a file and feeds them through
//! `RxProducer::write_raw`. Replay is paced by the ring: a chunk is only
//! read once the ring has room for it, so nothing is dropped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::domain::{PipelineResult, SampleFormat};
use crate::pipeline::RxProducer;
use crate::ports::IqSource;

/// Device samples read per chunk
const CHUNK_SAMPLES: usize = 8192;

/// Back-off while the ring is full
const FULL_BACKOFF: Duration = Duration::from_millis(2);

pub struct FileSource {
    path: PathBuf,
    format: SampleFormat,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>, format: SampleFormat) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }
}

impl IqSource for FileSource {
    fn describe(&self) -> String {
        format!("file {} ({:?})", self.path.display(), self.format)
    }

    fn run(&mut self, producer: RxProducer, running: Arc<AtomicBool>) -> PipelineResult<u64> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let width = self.format.sample_bytes();
        let mut chunk = vec![0u8; CHUNK_SAMPLES * width];
        let mut offered: u64 = 0;

        log::info!("replaying {}", self.describe());
        while running.load(Ordering::Relaxed) {
            // Room in the ring, expressed in device samples
            let room = producer.remainder() * producer.decimation() as usize;
            if room == 0 {
                thread::sleep(FULL_BACKOFF);
                continue;
            }
            let want = room.min(CHUNK_SAMPLES) * width;
            let read = read_up_to(&mut reader, &mut chunk[..want])?;
            if read == 0 {
                break;
            }
            producer.write_raw(&chunk[..read]);
            offered += (read / width) as u64;
        }
        log::info!("replay finished after {offered} samples");
        Ok(offered)
    }
}

/// Fill `buf` as far as the reader allows; short only at end of file
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
