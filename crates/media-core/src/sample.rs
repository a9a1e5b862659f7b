//! The sample type flowing through the element graph

use avflow_rtp_core::RtpTimestamp;
use bytes::Bytes;

/// Codec carried by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// Opus audio
    Opus,
    /// VP8 video
    Vp8,
    /// VP9 video
    Vp9,
    /// H264 video
    H264,
    /// Opaque serialized bytes, used for container output flowing between
    /// elements rather than decoded media
    Binary,
}

/// Media kind derived from a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
    /// Non-media byte stream
    Data,
}

impl CodecKind {
    /// The media kind this codec belongs to
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Opus => MediaKind::Audio,
            Self::Vp8 | Self::Vp9 | Self::H264 => MediaKind::Video,
            Self::Binary => MediaKind::Data,
        }
    }

    /// RTP clock rate in Hz
    pub fn clock_rate(&self) -> u32 {
        match self {
            Self::Opus => 48_000,
            Self::Vp8 | Self::Vp9 | Self::H264 => 90_000,
            Self::Binary => 0,
        }
    }

    /// Human-readable codec name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opus => "Opus",
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::H264 => "H264",
            Self::Binary => "Binary",
        }
    }
}

/// A reconstructed media sample
///
/// One sample is one depacketized codec frame (or one opaque byte chunk
/// for [`CodecKind::Binary`]). Samples are immutable once built and cheap
/// to clone; the payload is reference counted.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Identifier of the track (or multiplexer origin) the sample came from
    pub track_id: String,

    /// Codec of the payload
    pub codec: CodecKind,

    /// RTP timestamp of the frame, in codec clock units
    pub timestamp: RtpTimestamp,

    /// Builder output sequence number (wrapping)
    pub sequence_number: u16,

    /// Packets dropped by the reassembly window since the previous sample
    pub prev_dropped_packets: u16,

    /// Frame payload
    pub payload: Bytes,
}

impl Sample {
    /// Create a binary sample carrying opaque bytes
    pub fn binary(payload: Bytes) -> Self {
        Self {
            track_id: String::new(),
            codec: CodecKind::Binary,
            timestamp: 0,
            sequence_number: 0,
            prev_dropped_packets: 0,
            payload,
        }
    }
}
