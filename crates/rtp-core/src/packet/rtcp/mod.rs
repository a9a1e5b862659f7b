//! RTCP feedback packets
//!
//! Only the Picture Loss Indication is implemented; it is the one feedback
//! message the processing node originates (periodic keyframe requests).

pub mod pli;

pub use pli::RtcpPictureLossIndication;
