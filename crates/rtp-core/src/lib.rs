//! RTP packet model and RTCP feedback support for avflow.
//!
//! This crate implements the small slice of RTP/RTCP the processing node
//! needs: parsing inbound RTP packets handed over by the transport layer
//! and serializing Picture Loss Indication feedback for keyframe requests.
//! ICE/DTLS/SRTP and socket handling belong to the transport collaborator
//! and are out of scope here.

pub mod error;
pub mod packet;

pub use error::{Error, Result};
pub use packet::rtcp::RtcpPictureLossIndication;
pub use packet::{RtpHeader, RtpPacket};

/// RTP sequence number (16-bit, wrapping)
pub type RtpSequenceNumber = u16;

/// RTP timestamp in codec clock units
pub type RtpTimestamp = u32;

/// RTP synchronization source identifier
pub type RtpSsrc = u32;
