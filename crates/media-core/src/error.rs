//! Error handling for media processing
//!
//! One error enum covers the crate; variants map onto the failure classes
//! the pipeline distinguishes: configuration problems rejected at the
//! request boundary, codec problems surfaced from element writes, and
//! transport problems that end a track.

use thiserror::Error;

/// Result type alias for media operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// The track's codec has no depacketizer
    #[error("codec not supported: {codec}")]
    CodecNotSupported { codec: String },

    /// No element factory registered under the given type identifier
    #[error("element not found: {type_id}")]
    ElementNotFound { type_id: String },

    /// The element does not accept children
    #[error("attach not supported")]
    AttachNotSupported,

    /// An element with the same identity is already attached
    #[error("element already attached: {id}")]
    ElementAlreadyAttached { id: String },

    /// A codec payload could not be interpreted
    #[error("invalid payload: {details}")]
    InvalidPayload { details: String },

    /// Element configuration bytes could not be interpreted
    #[error("invalid configuration: {details}")]
    InvalidConfig { details: String },

    /// The remote track reached end of stream
    #[error("end of stream")]
    EndOfStream,

    /// The transport failed while reading a packet
    #[error("transport error: {details}")]
    Transport { details: String },

    /// I/O failure in a sink element
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a new codec-not-supported error
    pub fn codec_not_supported(codec: impl Into<String>) -> Self {
        Self::CodecNotSupported {
            codec: codec.into(),
        }
    }

    /// Create a new element-not-found error
    pub fn element_not_found(type_id: impl Into<String>) -> Self {
        Self::ElementNotFound {
            type_id: type_id.into(),
        }
    }

    /// Create a new invalid-payload error
    pub fn invalid_payload(details: impl Into<String>) -> Self {
        Self::InvalidPayload {
            details: details.into(),
        }
    }

    /// Create a new invalid-configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(details: impl Into<String>) -> Self {
        Self::Transport {
            details: details.into(),
        }
    }
}
