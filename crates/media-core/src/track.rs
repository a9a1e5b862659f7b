//! Remote track boundary
//!
//! The transport library that negotiates the peer connection owns the
//! actual socket; the pipeline only ever sees tracks through this trait.

use async_trait::async_trait;

use avflow_rtp_core::{RtpPacket, RtpSsrc};

use crate::error::Result;
use crate::sample::CodecKind;

/// One remote media track delivered by the transport collaborator
#[async_trait]
pub trait RemoteTrack: Send + Sync {
    /// Stable track identifier
    fn id(&self) -> String;

    /// Codec negotiated for this track
    fn codec(&self) -> CodecKind;

    /// Synchronization source of the remote stream
    fn ssrc(&self) -> RtpSsrc;

    /// Read the next RTP packet, blocking until one arrives.
    ///
    /// Returns [`MediaError::EndOfStream`](crate::MediaError::EndOfStream)
    /// when the remote side ends the track; any error is terminal for the
    /// reader.
    async fn read_rtp(&self) -> Result<RtpPacket>;
}
