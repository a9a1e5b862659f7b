//! H264 payload handling (RFC 6184)
//!
//! Single NAL units, STAP-A aggregates, and FU-A fragments are unpacked
//! into an Annex B byte stream with 4-byte start codes. FU-A fragments
//! are buffered inside the depacketizer until the end fragment arrives,
//! so a call can legitimately return an empty chunk.

use bytes::{BufMut, Bytes, BytesMut};

use super::Depacketizer;
use crate::error::{MediaError, Result};

const ANNEXB_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

const NALU_TYPE_STAP_A: u8 = 24;
const NALU_TYPE_FU_A: u8 = 28;

/// H264 depacketizer
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    fua_buffer: Option<BytesMut>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self { fua_buffer: None }
    }
}

impl Depacketizer for H264Depacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() < 2 {
            return Err(MediaError::invalid_payload("H264 payload too short"));
        }

        let nalu_type = payload[0] & 0x1F;
        match nalu_type {
            1..=23 => {
                let mut out = BytesMut::with_capacity(4 + payload.len());
                out.put_slice(&ANNEXB_START_CODE);
                out.put_slice(payload);
                Ok(out.freeze())
            }
            NALU_TYPE_STAP_A => {
                let mut out = BytesMut::new();
                let mut offset = 1;
                while offset < payload.len() {
                    if offset + 2 > payload.len() {
                        return Err(MediaError::invalid_payload("truncated STAP-A size"));
                    }
                    let size =
                        u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
                    offset += 2;
                    if offset + size > payload.len() {
                        return Err(MediaError::invalid_payload("truncated STAP-A unit"));
                    }
                    out.put_slice(&ANNEXB_START_CODE);
                    out.put_slice(&payload[offset..offset + size]);
                    offset += size;
                }
                Ok(out.freeze())
            }
            NALU_TYPE_FU_A => {
                let fu_header = payload[1];
                let start = fu_header & 0x80 != 0;
                let end = fu_header & 0x40 != 0;

                if start {
                    let mut buf = BytesMut::new();
                    buf.put_slice(&ANNEXB_START_CODE);
                    // reconstruct the NAL header from the indicator and FU header
                    buf.put_u8((payload[0] & 0xE0) | (fu_header & 0x1F));
                    self.fua_buffer = Some(buf);
                }

                match self.fua_buffer.as_mut() {
                    Some(buf) => buf.put_slice(&payload[2..]),
                    // middle fragment without a seen start: drop it
                    None => return Ok(Bytes::new()),
                }

                if end {
                    let buf = self.fua_buffer.take().unwrap_or_default();
                    Ok(buf.freeze())
                } else {
                    Ok(Bytes::new())
                }
            }
            _ => Err(MediaError::invalid_payload(format!(
                "unhandled NALU type {nalu_type}"
            ))),
        }
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        // no head gating for H264: any packet may start the stream
        !payload.is_empty()
    }
}
