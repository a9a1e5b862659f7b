//! Session and transport management for avflow.
//!
//! A [`MediaSession`] binds one peer connection's remote tracks to sample
//! builders and routes processing requests onto them, queueing requests
//! that arrive before their track does. The [`MediaNode`] aggregate owns
//! every session in the process and periodically logs a diagnostics dump.
//! The actual ICE/DTLS/SRTP machinery lives behind the
//! [`transport::PeerTransport`] trait and is provided by the embedding
//! application.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{Result, SessionError};
pub use logging::{init_logging, LoggingConfig};
pub use node::MediaNode;
pub use session::{MediaSession, SessionConfig};
pub use transport::{
    IceCandidate, PeerTransport, SdpType, SessionDescription, TransportEvent,
};
