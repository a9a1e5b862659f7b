//! VP8 payload handling (RFC 7741)
//!
//! The payload descriptor in front of each packet is variable length:
//!
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! |X|R|N|S|R| PID | (REQUIRED)
//! +-+-+-+-+-+-+-+-+
//! X:   |I|L|T|K| RSV | (OPTIONAL)
//! I:   |M| PictureID | (OPTIONAL, 7 or 15 bit)
//! L:   |   TL0PICIDX | (OPTIONAL)
//! T/K: |TID|Y| KEYIDX| (OPTIONAL)
//! ```
//!
//! Beyond depacketization this module knows how to read the uncompressed
//! VP8 frame header: keyframe detection and the pixel dimensions the
//! muxer needs for its track table.

use bytes::Bytes;

use super::Depacketizer;
use crate::error::{MediaError, Result};

/// VP8 depacketizer
#[derive(Debug, Default)]
pub struct Vp8Depacketizer;

impl Vp8Depacketizer {
    pub fn new() -> Self {
        Self
    }

    /// Length of the payload descriptor at the front of `payload`
    fn descriptor_len(payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Err(MediaError::invalid_payload("empty VP8 payload"));
        }

        let mut idx = 1;
        if payload[0] & 0x80 != 0 {
            // extension byte present
            if payload.len() <= idx {
                return Err(MediaError::invalid_payload("truncated VP8 descriptor"));
            }
            let ext = payload[idx];
            idx += 1;

            if ext & 0x80 != 0 {
                // PictureID, one or two bytes depending on the M bit
                if payload.len() <= idx {
                    return Err(MediaError::invalid_payload("truncated VP8 picture id"));
                }
                idx += if payload[idx] & 0x80 != 0 { 2 } else { 1 };
            }
            if ext & 0x40 != 0 {
                // TL0PICIDX
                idx += 1;
            }
            if ext & 0x30 != 0 {
                // TID/Y/KEYIDX share one byte
                idx += 1;
            }
        }

        if payload.len() <= idx {
            return Err(MediaError::invalid_payload("VP8 payload has no frame data"));
        }
        Ok(idx)
    }
}

impl Depacketizer for Vp8Depacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Result<Bytes> {
        let offset = Self::descriptor_len(payload)?;
        Ok(Bytes::copy_from_slice(&payload[offset..]))
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        if payload.is_empty() {
            return false;
        }
        // S bit set and partition index zero
        payload[0] & 0x10 != 0 && payload[0] & 0x07 == 0
    }
}

/// Whether a depacketized VP8 frame is a keyframe
pub fn is_keyframe(frame: &[u8]) -> bool {
    !frame.is_empty() && frame[0] & 0x01 == 0
}

/// Pixel dimensions carried in a VP8 keyframe header
///
/// Returns `None` for interframes or frames too short to carry the
/// uncompressed data chunk.
pub fn keyframe_dimensions(frame: &[u8]) -> Option<(u32, u32)> {
    if frame.len() < 10 || !is_keyframe(frame) {
        return None;
    }

    let raw = frame[6] as u32
        | (frame[7] as u32) << 8
        | (frame[8] as u32) << 16
        | (frame[9] as u32) << 24;
    let width = raw & 0x3FFF;
    let height = (raw >> 16) & 0x3FFF;
    Some((width, height))
}
