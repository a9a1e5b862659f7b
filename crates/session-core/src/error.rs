//! Error handling for session management

use thiserror::Error;

use avflow_media_core::MediaError;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error type for session operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// No session registered under the given identifier
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// A session with the identifier already exists
    #[error("session already exists: {id}")]
    SessionExists { id: String },

    /// The transport collaborator failed
    #[error("transport error: {details}")]
    Transport { details: String },

    /// Invalid configuration
    #[error("invalid configuration: {details}")]
    Config { details: String },

    /// An underlying media-layer failure
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl SessionError {
    /// Create a new session-not-found error
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Create a new session-exists error
    pub fn session_exists(id: impl Into<String>) -> Self {
        Self::SessionExists { id: id.into() }
    }

    /// Create a new transport error
    pub fn transport(details: impl Into<String>) -> Self {
        Self::Transport {
            details: details.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }
}
