//! Peer transport boundary
//!
//! The library that negotiates peer connections (ICE, DTLS, SRTP) is an
//! external collaborator; sessions drive it exclusively through this
//! trait. Remote tracks surface as [`TransportEvent::TrackAdded`] on the
//! transport's event stream, and keyframe requests flow back as RTCP
//! feedback packets.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use avflow_media_core::RemoteTrack;
use avflow_rtp_core::RtcpPictureLossIndication;

use crate::error::Result;

/// SDP message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description exchanged with the signaling plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

/// ICE candidate init payload exchanged with the signaling plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
}

/// Events delivered by a peer transport
pub enum TransportEvent {
    /// A remote track was observed and is readable
    TrackAdded(Arc<dyn RemoteTrack>),

    /// The transport shut down; no further events follow
    Closed,
}

/// Handler for locally gathered ICE candidates; `None` signals the end
/// of gathering
pub type IceCandidateHandler = Box<dyn Fn(Option<IceCandidate>) + Send + Sync>;

/// One peer connection as seen by the session layer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Start the connection and generate the local description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Generate an answer to a remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Set the local session description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Set the remote session description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Add a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Register the handler invoked for each locally gathered candidate
    fn on_ice_candidate(&self, handler: IceCandidateHandler);

    /// Send RTCP feedback packets (keyframe requests)
    async fn write_rtcp(&self, packets: &[RtcpPictureLossIndication]) -> Result<()>;

    /// Take the transport's event stream; yields `None` after the first
    /// call
    fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Close the transport
    async fn close(&self) -> Result<()>;
}
