//! Opus payload handling
//!
//! Opus over RTP (RFC 7587) carries exactly one Opus packet per RTP
//! payload, so depacketization is a passthrough; the payload itself may
//! aggregate multiple Opus frames but nothing downstream needs to split
//! them.

use bytes::Bytes;

use super::Depacketizer;
use crate::error::{MediaError, Result};

/// Opus depacketizer
#[derive(Debug, Default)]
pub struct OpusDepacketizer;

impl OpusDepacketizer {
    pub fn new() -> Self {
        Self
    }
}

impl Depacketizer for OpusDepacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Result<Bytes> {
        if payload.is_empty() {
            return Err(MediaError::invalid_payload("empty Opus payload"));
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        !payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut d = OpusDepacketizer::new();
        let payload = [0x78, 0x01, 0x02, 0x03];
        let out = d.depacketize(&payload).unwrap();
        assert_eq!(out.as_ref(), &payload);
        assert!(d.is_partition_head(&payload));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut d = OpusDepacketizer::new();
        assert!(d.depacketize(&[]).is_err());
        assert!(!d.is_partition_head(&[]));
    }
}
