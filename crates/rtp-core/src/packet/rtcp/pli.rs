use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP packet type for payload-specific feedback (PSFB)
pub const RTCP_PT_PSFB: u8 = 206;

/// Feedback message type for Picture Loss Indication
pub const FMT_PLI: u8 = 1;

/// Picture Loss Indication feedback packet
/// Defined in RFC 4585 Section 6.3.1
///
/// A PLI asks the media sender to produce a new keyframe. The processing
/// node sends one when a video track appears and then on a periodic cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpPictureLossIndication {
    /// SSRC of the packet sender
    pub sender_ssrc: RtpSsrc,

    /// SSRC of the media source the indication is about
    pub media_ssrc: RtpSsrc,
}

impl RtcpPictureLossIndication {
    /// Size of a PLI packet in bytes
    pub const SIZE: usize = 12;

    /// Create a new PLI for the given media source
    pub fn new(sender_ssrc: RtpSsrc, media_ssrc: RtpSsrc) -> Self {
        Self {
            sender_ssrc,
            media_ssrc,
        }
    }

    /// Parse a PLI from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::SIZE,
                available: buf.remaining(),
            });
        }

        let b0 = buf.get_u8();
        let version = b0 >> 6;
        if version != 2 {
            return Err(Error::InvalidVersion(version));
        }
        let fmt = b0 & 0x1F;
        if fmt != FMT_PLI {
            return Err(Error::InvalidPacket(format!(
                "unexpected feedback message type {fmt}"
            )));
        }

        let packet_type = buf.get_u8();
        if packet_type != RTCP_PT_PSFB {
            return Err(Error::UnexpectedPacketType {
                expected: RTCP_PT_PSFB,
                actual: packet_type,
            });
        }

        let length = buf.get_u16();
        if length != 2 {
            return Err(Error::InvalidPacket(format!(
                "unexpected PLI length {length}"
            )));
        }

        let sender_ssrc = buf.get_u32();
        let media_ssrc = buf.get_u32();

        Ok(Self {
            sender_ssrc,
            media_ssrc,
        })
    }

    /// Serialize this PLI to bytes
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(Self::SIZE);

        // V=2, P=0, FMT=1
        buf.put_u8(0x80 | FMT_PLI);
        buf.put_u8(RTCP_PT_PSFB);
        // length in 32-bit words minus one
        buf.put_u16(2);
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);

        Ok(())
    }
}
