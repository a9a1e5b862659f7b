//! VP9 payload handling (draft-ietf-payload-vp9)
//!
//! Flexible and non-flexible mode descriptors are both accepted; the
//! scalability structure, when present, is skipped rather than
//! interpreted since nothing downstream consumes it.

use bytes::Bytes;

use super::Depacketizer;
use crate::error::{MediaError, Result};

/// VP9 depacketizer
#[derive(Debug, Default)]
pub struct Vp9Depacketizer;

impl Vp9Depacketizer {
    pub fn new() -> Self {
        Self
    }

    fn descriptor_len(payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Err(MediaError::invalid_payload("empty VP9 payload"));
        }

        let b0 = payload[0];
        let i = b0 & 0x80 != 0;
        let p = b0 & 0x40 != 0;
        let l = b0 & 0x20 != 0;
        let f = b0 & 0x10 != 0;
        let v = b0 & 0x02 != 0;

        let mut idx = 1;
        let need = |idx: usize, len: usize| -> Result<()> {
            if len <= idx {
                Err(MediaError::invalid_payload("truncated VP9 descriptor"))
            } else {
                Ok(())
            }
        };

        if i {
            need(idx, payload.len())?;
            idx += if payload[idx] & 0x80 != 0 { 2 } else { 1 };
        }
        if l {
            idx += 1;
            if !f {
                // TL0PICIDX only exists in non-flexible mode
                idx += 1;
            }
        }
        if f && p {
            // up to three P_DIFF bytes, chained through the N bit
            for _ in 0..3 {
                need(idx, payload.len())?;
                let n = payload[idx] & 0x01 != 0;
                idx += 1;
                if !n {
                    break;
                }
            }
        }
        if v {
            need(idx, payload.len())?;
            let ss = payload[idx];
            idx += 1;
            let n_s = ((ss >> 5) & 0x07) as usize + 1;
            let y = ss & 0x10 != 0;
            let g = ss & 0x08 != 0;
            if y {
                idx += n_s * 4;
            }
            if g {
                need(idx, payload.len())?;
                let n_g = payload[idx] as usize;
                idx += 1;
                for _ in 0..n_g {
                    need(idx, payload.len())?;
                    let r = ((payload[idx] >> 2) & 0x03) as usize;
                    idx += 1 + r;
                }
            }
        }

        if payload.len() <= idx {
            return Err(MediaError::invalid_payload("VP9 payload has no frame data"));
        }
        Ok(idx)
    }
}

impl Depacketizer for Vp9Depacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Result<Bytes> {
        let offset = Self::descriptor_len(payload)?;
        Ok(Bytes::copy_from_slice(&payload[offset..]))
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        // B bit: beginning of a frame
        !payload.is_empty() && payload[0] & 0x08 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_descriptor() {
        let mut d = Vp9Depacketizer::new();
        // B set, no optional fields
        let out = d.depacketize(&[0x08, 0x42]).unwrap();
        assert_eq!(out.as_ref(), &[0x42]);
        assert!(d.is_partition_head(&[0x08, 0x42]));
    }

    #[test]
    fn test_picture_id_and_layers() {
        let mut d = Vp9Depacketizer::new();
        // I + L, non-flexible: pid(15bit, 2 bytes), layer byte, TL0PICIDX
        let payload = [0xA8, 0x81, 0x23, 0x00, 0x07, 0xCA, 0xFE];
        let out = d.depacketize(&payload).unwrap();
        assert_eq!(out.as_ref(), &[0xCA, 0xFE]);
    }

    #[test]
    fn test_flexible_ref_indices() {
        let mut d = Vp9Depacketizer::new();
        // P + F: two P_DIFF bytes (first chained via N bit)
        let payload = [0x58, 0x03, 0x02, 0xBE, 0xEF];
        let out = d.depacketize(&payload).unwrap();
        assert_eq!(out.as_ref(), &[0xBE, 0xEF]);
    }

    #[test]
    fn test_truncated_rejected() {
        let mut d = Vp9Depacketizer::new();
        assert!(d.depacketize(&[]).is_err());
        assert!(d.depacketize(&[0x80]).is_err());
    }
}
