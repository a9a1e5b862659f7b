//! RTP packet parsing and serialization
//!
//! Defined in RFC 3550 Section 5.1. Only the receive path needs full
//! header handling (CSRC list, extension, padding); serialization exists
//! for tests and for transports that loop packets back in-process.

pub mod rtcp;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// Minimum size of an RTP header in bytes (no CSRCs, no extension)
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// RTP packet header
/// Defined in RFC 3550 Section 5.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (always 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// Marker bit (frame boundary for many video payload formats)
    pub marker: bool,

    /// Payload type
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp in codec clock units
    pub timestamp: RtpTimestamp,

    /// Synchronization source
    pub ssrc: RtpSsrc,

    /// Contributing sources
    pub csrc: Vec<RtpSsrc>,

    /// Header extension profile and payload, when the extension flag is set
    pub extension_header: Option<ExtensionHeader>,
}

/// RTP header extension (RFC 3550 Section 5.3.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionHeader {
    /// Profile-defined identifier
    pub profile: u16,

    /// Extension payload (a multiple of 4 bytes)
    pub data: Bytes,
}

impl RtpHeader {
    /// Create a header with the given media fields and default flags
    pub fn new(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
    ) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension_header: None,
        }
    }

    /// Size of this header in bytes once serialized
    pub fn size(&self) -> usize {
        let mut size = RTP_MIN_HEADER_SIZE + self.csrc.len() * 4;
        if let Some(ext) = &self.extension_header {
            size += 4 + ext.data.len();
        }
        size
    }

    /// Parse an RTP header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let b0 = buf.get_u8();
        let version = b0 >> 6;
        if version != 2 {
            return Err(Error::InvalidVersion(version));
        }
        let padding = (b0 & 0x20) != 0;
        let extension = (b0 & 0x10) != 0;
        let csrc_count = (b0 & 0x0F) as usize;

        let b1 = buf.get_u8();
        let marker = (b1 & 0x80) != 0;
        let payload_type = b1 & 0x7F;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < csrc_count * 4 {
            return Err(Error::BufferTooSmall {
                required: csrc_count * 4,
                available: buf.remaining(),
            });
        }
        let mut csrc = Vec::with_capacity(csrc_count);
        for _ in 0..csrc_count {
            csrc.push(buf.get_u32());
        }

        let extension_header = if extension {
            if buf.remaining() < 4 {
                return Err(Error::BufferTooSmall {
                    required: 4,
                    available: buf.remaining(),
                });
            }
            let profile = buf.get_u16();
            let words = buf.get_u16() as usize;
            if buf.remaining() < words * 4 {
                return Err(Error::BufferTooSmall {
                    required: words * 4,
                    available: buf.remaining(),
                });
            }
            Some(ExtensionHeader {
                profile,
                data: buf.copy_to_bytes(words * 4),
            })
        } else {
            None
        };

        Ok(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_header,
        })
    }

    /// Serialize this header to bytes
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        if let Some(ext) = &self.extension_header {
            if ext.data.len() % 4 != 0 {
                return Err(Error::InvalidPacket(
                    "extension data must be a multiple of 4 bytes".to_string(),
                ));
            }
        }

        buf.reserve(self.size());

        let mut b0 = (self.version & 0x03) << 6;
        if self.padding {
            b0 |= 0x20;
        }
        if self.extension_header.is_some() {
            b0 |= 0x10;
        }
        b0 |= (self.csrc.len() as u8) & 0x0F;
        buf.put_u8(b0);

        let mut b1 = self.payload_type & 0x7F;
        if self.marker {
            b1 |= 0x80;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some(ext) = &self.extension_header {
            buf.put_u16(ext.profile);
            buf.put_u16((ext.data.len() / 4) as u16);
            buf.put_slice(&ext.data);
        }

        Ok(())
    }
}

/// A complete RTP packet: header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Packet header
    pub header: RtpHeader,

    /// Codec payload (padding already removed)
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new packet from a header and payload
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Parse a full packet from bytes, stripping any padding
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let header = RtpHeader::parse(&mut buf)?;

        let mut payload_len = buf.remaining();
        if header.padding {
            if payload_len == 0 {
                return Err(Error::InvalidPacket(
                    "padding flag set on empty payload".to_string(),
                ));
            }
            let pad = data[data.len() - 1] as usize;
            if pad == 0 || pad > payload_len {
                return Err(Error::InvalidPacket(format!(
                    "invalid padding length {pad}"
                )));
            }
            payload_len -= pad;
        }

        let payload = Bytes::copy_from_slice(&buf.chunk()[..payload_len]);
        Ok(Self { header, payload })
    }

    /// Serialize this packet to a fresh buffer
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.header.size() + self.payload.len());
        self.header.serialize(&mut buf)?;
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_serialize_parse() {
        let mut header = RtpHeader::new(96, 1234, 567890, 0xDEADBEEF);
        header.marker = true;

        let mut buf = BytesMut::new();
        header.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), RTP_MIN_HEADER_SIZE);

        let parsed = RtpHeader::parse(&mut buf.freeze()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_packet_roundtrip_with_csrc_and_extension() {
        let mut header = RtpHeader::new(97, 7, 90_000, 0x1234_5678);
        header.csrc = vec![1, 2];
        header.extension = true;
        header.extension_header = Some(ExtensionHeader {
            profile: 0xBEDE,
            data: Bytes::from_static(&[0x10, 0xAA, 0x00, 0x00]),
        });
        let packet = RtpPacket::new(header, Bytes::from_static(&[9, 8, 7, 6]));

        let wire = packet.serialize().unwrap();
        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_parse_strips_padding() {
        let header = RtpHeader::new(96, 1, 1, 1);
        let mut buf = BytesMut::new();
        header.serialize(&mut buf).unwrap();
        // set padding flag manually and append payload + 3 padding bytes
        buf[0] |= 0x20;
        buf.put_slice(&[0xAB, 0xCD, 0x00, 0x00, 0x03]);

        let parsed = RtpPacket::parse(&buf).unwrap();
        assert!(parsed.header.padding);
        assert_eq!(parsed.payload.as_ref(), &[0xAB, 0xCD]);
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let data = [0x00u8; 12];
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(Error::InvalidVersion(0))
        ));
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        let data = [0x80u8; 4];
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(Error::BufferTooSmall { .. })
        ));
    }
}
