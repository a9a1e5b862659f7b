//! Error types for RTP/RTCP packet handling

use thiserror::Error;

/// Result type alias for packet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or serializing RTP/RTCP packets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer does not hold enough bytes for the structure being parsed
    #[error("Buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// The version field does not carry RTP version 2
    #[error("Invalid RTP version: {0}")]
    InvalidVersion(u8),

    /// The packet is structurally invalid
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// An RTCP packet type field did not match the expected type
    #[error("Unexpected RTCP packet type: expected {expected}, got {actual}")]
    UnexpectedPacketType { expected: u8, actual: u8 },
}
