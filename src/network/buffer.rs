//! FrameBuffer: reassembles network frames into a raw sample byte stream
//!
//! `Unsynced -> Synced -> Unsynced`. Every metadata record is validated; any
//! mismatch drops back to `Unsynced` and payload is ignored until the next
//! good record. Payload integrity is only tracked statistically: a frame
//! with a bad payload checksum is still decoded.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use serde::Serialize;

use crate::domain::{FrameError, Sample, SampleFormat};

use super::meta::{payload_checksum, FrameMetadata, META_WIRE_LEN};

/// Frames per statistics window; counters are logged and cleared after it
pub const STATS_WINDOW: u32 = 100;

/// Decoder counters over the current statistics window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FrameStats {
    /// Frames decoded in this window
    pub decodes: u32,
    /// Frames whose decoded size matched the declared frame size
    pub successful_decodes: u32,
    /// Frames whose payload checksum matched
    pub crc_ok: u32,
    /// Bytes lost because the raw buffer was full (not windowed)
    pub dropped_bytes: u64,
    /// Frames completed since creation (not windowed)
    pub total_frames: u64,
}

/// What a datagram turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram {
    /// A valid metadata record; the buffer is synced
    Metadata,
    /// Payload bytes; carries the number of bytes delivered to the raw buffer
    Payload(usize),
}

pub struct FrameBuffer {
    block_size: u16,
    synced: bool,
    meta: Option<FrameMetadata>,
    payload_crc: u64,
    /// Expected wire bytes of the current frame
    in_size: usize,
    in_count: usize,
    in_buffer: Vec<u8>,
    out_buffer: Vec<u8>,
    frame_size: usize,
    raw: Option<HeapRb<u8>>,
    stats: FrameStats,
}

impl FrameBuffer {
    /// `block_size` must match the sender's, it is not negotiated
    pub fn new(block_size: u16) -> Self {
        Self {
            block_size,
            synced: false,
            meta: None,
            payload_crc: 0,
            in_size: 0,
            in_count: 0,
            in_buffer: Vec::new(),
            out_buffer: Vec::new(),
            frame_size: 0,
            raw: None,
            stats: FrameStats::default(),
        }
    }

    /// Validate a metadata datagram and size the buffers for its frame.
    ///
    /// On any error the buffer is `Unsynced` and no buffer is touched.
    pub fn read_meta(&mut self, datagram: &[u8]) -> Result<FrameMetadata, FrameError> {
        let result = self.accept_meta(datagram);
        if let Err(e) = &result {
            if self.synced {
                log::warn!("frame buffer: lost sync: {e}");
            } else {
                log::debug!("frame buffer: metadata rejected: {e}");
            }
            self.synced = false;
        }
        result
    }

    fn accept_meta(&mut self, datagram: &[u8]) -> Result<FrameMetadata, FrameError> {
        let (meta, payload_crc) = FrameMetadata::decode(datagram)?;
        if meta.block_size != self.block_size {
            return Err(FrameError::BlockSize {
                configured: self.block_size,
                declared: meta.block_size,
            });
        }
        let format = meta
            .sample_format()
            .ok_or(FrameError::SampleWidth(meta.sample_bytes))?;
        let frame_size = meta.frame_size();
        if frame_size == 0 {
            return Err(FrameError::EmptyFrame);
        }
        if meta.compressed {
            let bound = lz4_flex::block::get_maximum_output_size(frame_size);
            if meta.raw_bytes == 0 || meta.raw_bytes as usize > bound {
                return Err(FrameError::CompressedSize {
                    declared: meta.raw_bytes,
                    bound,
                });
            }
        }

        if self.meta.as_ref() != Some(&meta) {
            log::debug!(
                "frame buffer: |{}:{}:{}:{}:{}:{}||{}:{}|{}:{}",
                meta.center_frequency,
                meta.sample_rate,
                meta.sample_bytes,
                meta.sample_bits,
                meta.block_size,
                meta.samples_per_block,
                meta.blocks_per_frame,
                meta.raw_bytes,
                meta.tv_sec,
                meta.tv_usec
            );
        }

        self.in_size = if meta.compressed {
            meta.raw_bytes as usize
        } else {
            frame_size
        };
        if self.in_buffer.len() < self.in_size {
            self.in_buffer.resize(self.in_size, 0);
        }
        if frame_size != self.frame_size || self.out_buffer.len() != frame_size {
            self.out_buffer.resize(frame_size, 0);
        }
        if frame_size != self.frame_size || self.raw.is_none() {
            self.resize_raw(&meta, format, frame_size);
        }

        self.in_count = 0;
        self.frame_size = frame_size;
        self.payload_crc = payload_crc;
        self.meta = Some(meta);
        self.synced = true;
        Ok(meta)
    }

    /// Hold at least one second of samples at the declared rate
    fn resize_raw(&mut self, meta: &FrameMetadata, format: SampleFormat, frame_size: usize) {
        let per_second = meta.sample_rate as usize * format.sample_bytes();
        let frames = per_second / frame_size + 1;
        log::info!("frame buffer: frame size {frame_size} bytes, raw buffer {frames} frames");
        self.raw = Some(HeapRb::new(frames * frame_size));
    }

    /// Accumulate payload bytes of the current frame.
    ///
    /// Returns the number of bytes delivered to the raw buffer, which is
    /// zero until a frame completes. Bytes beyond the declared frame
    /// length are discarded.
    pub fn write_data(&mut self, data: &[u8]) -> Result<usize, FrameError> {
        if !self.synced {
            return Err(FrameError::NotSynced);
        }

        let room = self.in_size.saturating_sub(self.in_count);
        let take = room.min(data.len());
        self.in_buffer[self.in_count..self.in_count + take].copy_from_slice(&data[..take]);
        self.in_count += take;

        if self.in_count < self.in_size {
            return Ok(0);
        }
        self.in_count = 0;
        Ok(self.complete_frame())
    }

    fn complete_frame(&mut self) -> usize {
        let compressed = self.meta.is_some_and(|m| m.compressed);
        let payload = &self.in_buffer[..self.in_size];

        if payload_checksum(payload) == self.payload_crc {
            self.stats.crc_ok += 1;
        } else {
            log::trace!("frame buffer: payload checksum mismatch");
        }

        let decoded = if compressed {
            match lz4_flex::block::decompress_into(payload, &mut self.out_buffer) {
                Ok(n) => n,
                Err(e) => {
                    log::debug!("frame buffer: decompression failed: {e}");
                    0
                }
            }
        } else {
            self.out_buffer[..self.in_size].copy_from_slice(payload);
            self.in_size
        };

        self.stats.decodes += 1;
        self.stats.total_frames += 1;
        if decoded == self.frame_size {
            self.stats.successful_decodes += 1;
        }

        let delivered = match &mut self.raw {
            Some(raw) => raw.push_slice(&self.out_buffer[..decoded]),
            None => 0,
        };
        if delivered < decoded {
            self.stats.dropped_bytes += (decoded - delivered) as u64;
        }

        if self.stats.decodes == STATS_WINDOW {
            log::info!(
                "frame buffer: decoding {}:{}/{}",
                self.stats.crc_ok,
                self.stats.successful_decodes,
                self.stats.decodes
            );
            self.stats.decodes = 0;
            self.stats.successful_decodes = 0;
            self.stats.crc_ok = 0;
        }
        delivered
    }

    /// Route a datagram: exactly `META_WIRE_LEN` bytes is metadata,
    /// anything else is payload.
    pub fn ingest(&mut self, datagram: &[u8]) -> Result<Datagram, FrameError> {
        if datagram.len() == META_WIRE_LEN {
            self.read_meta(datagram)?;
            Ok(Datagram::Metadata)
        } else {
            self.write_data(datagram).map(Datagram::Payload)
        }
    }

    /// Pop raw bytes; returns how many were copied
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        match &mut self.raw {
            Some(raw) => raw.pop_slice(out),
            None => 0,
        }
    }

    /// Pop up to `max` complete samples, decoded per the declared width
    pub fn read_samples(&mut self, max: usize) -> Vec<Sample> {
        let Some(format) = self.meta.and_then(|m| m.sample_format()) else {
            return Vec::new();
        };
        let width = format.sample_bytes();
        let count = max.min(self.available() / width);
        let mut bytes = vec![0u8; count * width];
        let read = self.read(&mut bytes);
        bytes[..read]
            .chunks_exact(width)
            .map(|chunk| decode_sample(format, chunk))
            .collect()
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Decoded size of the current frame in bytes
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Raw buffer capacity in bytes; zero before the first good record
    pub fn raw_capacity(&self) -> usize {
        self.raw.as_ref().map_or(0, |raw| raw.capacity().get())
    }

    /// Raw bytes waiting to be read
    pub fn available(&self) -> usize {
        self.raw.as_ref().map_or(0, |raw| raw.occupied_len())
    }

    /// Metadata of the current frame
    pub fn metadata(&self) -> Option<FrameMetadata> {
        self.meta
    }
}

fn decode_sample(format: SampleFormat, chunk: &[u8]) -> Sample {
    match format {
        SampleFormat::S8 => Sample::new(chunk[0] as i8 as f32 / 128.0, chunk[1] as i8 as f32 / 128.0),
        _ => Sample::new(
            i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0,
            i16::from_le_bytes([chunk[2], chunk[3]]) as f32 / 32768.0,
        ),
    }
}
