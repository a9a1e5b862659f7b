//! avflow: a media-processing node for WebRTC sessions.
//!
//! Joins media sessions downstream of a relay, rebuilds codec-level
//! samples from each track's RTP stream, and routes them through a
//! runtime-assembled graph of processing elements (recorders, filters,
//! muxers).
//!
//! This crate re-exports the member crates under stable paths:
//!
//! - [`rtp_core`]: RTP packet model and RTCP feedback
//! - [`media_core`]: sample builders, elements, the WebM muxer
//! - [`session_core`]: sessions, the node aggregate, the transport
//!   trait boundary

pub use avflow_media_core as media_core;
pub use avflow_rtp_core as rtp_core;
pub use avflow_session_core as session_core;

/// Commonly used types, importable in one line
pub mod prelude {
    pub use avflow_media_core::element::{register_stock_elements, Element, ElementRegistry};
    pub use avflow_media_core::mux::{WebmSaver, WebmSaverConfig};
    pub use avflow_media_core::{CodecKind, MediaKind, RemoteTrack, Sample, SampleBuilder};
    pub use avflow_session_core::{
        Config, MediaNode, MediaSession, PeerTransport, TransportEvent,
    };
}
