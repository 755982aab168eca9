//! Frame metadata record
//!
//! Wire layout, little endian, packed:
//!
//! ```text
//! center_frequency u64 | sample_rate u32 | sample_bytes u8 | sample_bits u8 |
//! block_size u16 | samples_per_block u32 | blocks_per_frame u16 |
//! raw_bytes u32 | tv_sec u32 | tv_usec u32 | header_crc u64
//! ```
//!
//! The low nibble of `sample_bytes` is the width of one component, bit 0x10
//! flags an LZ4 compressed payload. `header_crc` covers every byte before it.
//! The datagram carrying the record appends the 8-byte payload checksum.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_64_XZ};

use crate::domain::{FrameError, SampleFormat};

/// 64-bit CRC used for both the header and the payload
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Length of the metadata record including its header checksum
pub const META_LEN: usize = 42;

/// Length of a metadata datagram: record plus payload checksum
pub const META_WIRE_LEN: usize = META_LEN + 8;

const COMPRESSED_FLAG: u8 = 0x10;
const WIDTH_MASK: u8 = 0x0F;

/// Checksum of a frame payload as carried in the metadata datagram
pub fn payload_checksum(payload: &[u8]) -> u64 {
    CRC64.checksum(payload)
}

/// Description of the frame that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    /// Capture center frequency in Hz
    pub center_frequency: u64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bytes per I or Q component
    pub sample_bytes: u8,
    /// Significant bits per component
    pub sample_bits: u8,
    /// Transport block size, agreed out of band
    pub block_size: u16,
    pub samples_per_block: u32,
    pub blocks_per_frame: u16,
    /// Bytes on the wire for this frame (compressed size when compressed)
    pub raw_bytes: u32,
    pub compressed: bool,
    pub tv_sec: u32,
    pub tv_usec: u32,
}

impl FrameMetadata {
    /// Parse a metadata datagram, returning the record and the payload
    /// checksum it carries.
    pub fn decode(datagram: &[u8]) -> Result<(Self, u64), FrameError> {
        if datagram.len() < META_WIRE_LEN {
            return Err(FrameError::TooShort {
                expected: META_WIRE_LEN,
                actual: datagram.len(),
            });
        }

        let computed = CRC64.checksum(&datagram[..META_LEN - 8]);
        let mut buf = &datagram[..META_WIRE_LEN];

        let center_frequency = buf.get_u64_le();
        let sample_rate = buf.get_u32_le();
        let packed = buf.get_u8();
        let sample_bits = buf.get_u8();
        let block_size = buf.get_u16_le();
        let samples_per_block = buf.get_u32_le();
        let blocks_per_frame = buf.get_u16_le();
        let raw_bytes = buf.get_u32_le();
        let tv_sec = buf.get_u32_le();
        let tv_usec = buf.get_u32_le();
        let carried = buf.get_u64_le();
        let payload_crc = buf.get_u64_le();

        if computed != carried {
            return Err(FrameError::HeaderChecksum { computed, carried });
        }

        let meta = Self {
            center_frequency,
            sample_rate,
            sample_bytes: packed & WIDTH_MASK,
            sample_bits,
            block_size,
            samples_per_block,
            blocks_per_frame,
            raw_bytes,
            compressed: packed & COMPRESSED_FLAG != 0,
            tv_sec,
            tv_usec,
        };
        Ok((meta, payload_crc))
    }

    /// Serialize into a metadata datagram with a fresh header checksum
    pub fn encode(&self, payload_crc: u64) -> Bytes {
        let mut buf = BytesMut::with_capacity(META_WIRE_LEN);
        buf.put_u64_le(self.center_frequency);
        buf.put_u32_le(self.sample_rate);
        let flag = if self.compressed { COMPRESSED_FLAG } else { 0 };
        buf.put_u8((self.sample_bytes & WIDTH_MASK) | flag);
        buf.put_u8(self.sample_bits);
        buf.put_u16_le(self.block_size);
        buf.put_u32_le(self.samples_per_block);
        buf.put_u16_le(self.blocks_per_frame);
        buf.put_u32_le(self.raw_bytes);
        buf.put_u32_le(self.tv_sec);
        buf.put_u32_le(self.tv_usec);
        let crc = CRC64.checksum(&buf);
        buf.put_u64_le(crc);
        buf.put_u64_le(payload_crc);
        buf.freeze()
    }

    /// Decompressed frame size in bytes: width × 2 × samples × blocks
    pub fn frame_size(&self) -> usize {
        self.sample_bytes as usize
            * 2
            * self.samples_per_block as usize
            * self.blocks_per_frame as usize
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Component encoding of the payload, if it is one we can decode
    pub fn sample_format(&self) -> Option<SampleFormat> {
        match self.sample_bytes {
            1 => Some(SampleFormat::S8),
            2 => Some(SampleFormat::S16Le),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> FrameMetadata {
        FrameMetadata {
            center_frequency: 435_000_000,
            sample_rate: 48_000,
            sample_bytes: 2,
            sample_bits: 12,
            block_size: 512,
            samples_per_block: 128,
            blocks_per_frame: 4,
            raw_bytes: 2048,
            compressed: true,
            tv_sec: 1_700_000_000,
            tv_usec: 250_000,
        }
    }

    #[test]
    fn test_encoded_layout() {
        let wire = sample_meta().encode(0xDEAD_BEEF);
        assert_eq!(wire.len(), META_WIRE_LEN);
        // packed width byte carries the compression flag
        assert_eq!(wire[12], 0x12);
        assert_eq!(&wire[META_LEN..], &0xDEAD_BEEFu64.to_le_bytes());
    }

    #[test]
    fn test_decode_recovers_fields() {
        let meta = sample_meta();
        let (decoded, payload_crc) = FrameMetadata::decode(&meta.encode(42)).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(payload_crc, 42);
        assert_eq!(decoded.frame_size(), 2 * 2 * 128 * 4);
    }

    #[test]
    fn test_corrupted_header_rejected() {
        let mut wire = sample_meta().encode(0).to_vec();
        wire[4] ^= 0x01;
        assert!(matches!(
            FrameMetadata::decode(&wire),
            Err(FrameError::HeaderChecksum { .. })
        ));
    }

    #[test]
    fn test_payload_checksum_not_covered_by_header() {
        let mut wire = sample_meta().encode(0).to_vec();
        wire[META_WIRE_LEN - 1] ^= 0xFF;
        assert!(FrameMetadata::decode(&wire).is_ok());
    }

    #[test]
    fn test_short_record_rejected() {
        let err = FrameMetadata::decode(&[0u8; 20]).unwrap_err();
        assert_eq!(
            err,
            FrameError::TooShort {
                expected: META_WIRE_LEN,
                actual: 20
            }
        );
    }

    #[test]
    fn test_crc_matches_xz_check_value() {
        assert_eq!(CRC64.checksum(b"123456789"), 0x995D_C9BB_DF19_39FA);
    }
}
