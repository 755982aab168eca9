//! Circular sample store with two-region wrap-around access
//!
//! `SampleRing` hands out index ranges into its backing store instead of
//! copying. A request that crosses the end of the store comes back as two
//! contiguous regions; the second one is empty when there is no wrap.
//!
//! Not synchronized: the owning pipeline serializes access behind its mutex.

use std::ops::Range;

use crate::domain::Sample;

/// Smallest ring ever allocated, in samples
pub const MIN_RING_CAPACITY: usize = 4096;

/// Pair of half-open index ranges into the backing store
pub type Regions = (Range<usize>, Range<usize>);

pub struct SampleRing {
    data: Vec<Sample>,
    read_pos: usize,
    write_pos: usize,
    /// Number of written but unread samples
    fill: usize,
}

impl SampleRing {
    /// Create a ring holding `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![Sample::new(0.0, 0.0); capacity.max(1)],
            read_pos: 0,
            write_pos: 0,
            fill: 0,
        }
    }

    /// Capacity used for a given sample rate: about 0.64 s of samples
    pub fn size_policy(sample_rate: u32) -> usize {
        ((sample_rate as usize / 100) * 64).max(MIN_RING_CAPACITY)
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Slots writable without overwriting unread samples
    pub fn remainder(&self) -> usize {
        self.data.len() - self.fill
    }

    /// Samples written and not yet read
    pub fn available(&self) -> usize {
        self.fill
    }

    /// Reserve up to `n` slots at the write cursor and advance past them
    pub fn write(&mut self, n: usize) -> Regions {
        let n = n.min(self.remainder());
        let regions = self.split(self.write_pos, n);
        self.write_pos = (self.write_pos + n) % self.data.len();
        self.fill += n;
        regions
    }

    /// Claim up to `n` unread samples at the read cursor and advance past them
    pub fn read(&mut self, n: usize) -> Regions {
        let n = n.min(self.fill);
        let regions = self.split(self.read_pos, n);
        self.read_pos = (self.read_pos + n) % self.data.len();
        self.fill -= n;
        regions
    }

    /// Clear both cursors, keeping the allocation
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.fill = 0;
    }

    /// Reallocate to `capacity` samples; unread samples are dropped
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity != self.data.len() {
            self.data = vec![Sample::new(0.0, 0.0); capacity];
        }
        self.reset();
    }

    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Sample] {
        &mut self.data
    }

    /// Copy `samples` in at the write cursor; returns how many fit
    pub fn write_from(&mut self, samples: &[Sample]) -> usize {
        let (first, second) = self.write(samples.len());
        let split = first.len();
        self.data[first].copy_from_slice(&samples[..split]);
        let rest = second.len();
        self.data[second].copy_from_slice(&samples[split..split + rest]);
        split + rest
    }

    /// Copy unread samples into `out`; returns how many were copied
    pub fn read_into(&mut self, out: &mut [Sample]) -> usize {
        let (first, second) = self.read(out.len());
        let split = first.len();
        out[..split].copy_from_slice(&self.data[first]);
        let rest = second.len();
        out[split..split + rest].copy_from_slice(&self.data[second]);
        split + rest
    }

    fn split(&self, start: usize, n: usize) -> Regions {
        let len = self.data.len();
        let first_len = n.min(len - start);
        let first = start..start + first_len;
        let second = 0..(n - first_len);
        (first, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f32) -> Sample {
        Sample::new(v, -v)
    }

    #[test]
    fn test_write_without_wrap_has_empty_second_region() {
        let mut ring = SampleRing::new(8);
        let (a, b) = ring.write(5);
        assert_eq!(a, 0..5);
        assert!(b.is_empty());
        assert_eq!(ring.remainder(), 3);
        assert_eq!(ring.available(), 5);
    }

    #[test]
    fn test_write_wraps_into_two_regions() {
        let mut ring = SampleRing::new(8);
        ring.write(6);
        ring.read(4);
        let (a, b) = ring.write(5);
        assert_eq!(a, 6..8);
        assert_eq!(b, 0..3);
        assert_eq!(ring.remainder(), 1);
    }

    #[test]
    fn test_read_returns_fewer_when_short() {
        let mut ring = SampleRing::new(8);
        ring.write(3);
        let (a, b) = ring.read(10);
        assert_eq!(a.len() + b.len(), 3);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_write_never_exceeds_remainder() {
        let mut ring = SampleRing::new(8);
        let (a, b) = ring.write(20);
        assert_eq!(a.len() + b.len(), 8);
        let (a, b) = ring.write(1);
        assert!(a.is_empty() && b.is_empty());
    }

    #[test]
    fn test_resize_drops_pending_samples() {
        let mut ring = SampleRing::new(8);
        ring.write(5);
        ring.resize(16);
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.remainder(), 16);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut ring = SampleRing::new(8);
        ring.write(7);
        ring.reset();
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.remainder(), 8);
    }

    #[test]
    fn test_size_policy_has_floor() {
        assert_eq!(SampleRing::size_policy(1_000), MIN_RING_CAPACITY);
        assert_eq!(SampleRing::size_policy(48_000), 30_720);
    }

    #[test]
    fn test_stream_order_preserved_across_wraps() {
        // Irregular write/read sizes against a small ring: everything read
        // back must equal everything written, in order.
        let mut ring = SampleRing::new(7);
        let mut next = 0u32;
        let mut written = Vec::new();
        let mut read_back = Vec::new();
        let write_sizes = [3usize, 5, 2, 7, 1, 4, 6, 2, 3];
        let read_sizes = [2usize, 4, 1, 6, 3, 5, 2, 7, 1];

        for (&w, &r) in write_sizes.iter().cycle().zip(read_sizes.iter().cycle()).take(60) {
            let n = w.min(ring.remainder());
            let chunk: Vec<Sample> = (0..n)
                .map(|_| {
                    next += 1;
                    sample(next as f32)
                })
                .collect();
            assert_eq!(ring.write_from(&chunk), n);
            written.extend_from_slice(&chunk);

            let (a, b) = ring.read(r);
            assert!(a.end <= ring.capacity() && b.end <= ring.capacity());
            assert!(b.is_empty() || b.end <= a.start, "regions overlap: {a:?} {b:?}");
            read_back.extend_from_slice(&ring.data()[a]);
            read_back.extend_from_slice(&ring.data()[b]);
        }
        let mut tail = vec![Sample::new(0.0, 0.0); ring.available()];
        let n = ring.read_into(&mut tail);
        read_back.extend_from_slice(&tail[..n]);

        assert_eq!(read_back, written);
    }
}
