//! RTP payload format handlers
//!
//! One depacketizer per supported codec turns a stream of RTP payloads
//! back into complete encoded frames. Each handler also knows how to
//! recognize a partition head, the packet a decoder may start from; the
//! sequencer uses that to gate the first frame it emits.

pub mod h264;
pub mod opus;
pub mod vp8;
pub mod vp9;

pub use h264::H264Depacketizer;
pub use opus::OpusDepacketizer;
pub use vp8::Vp8Depacketizer;
pub use vp9::Vp9Depacketizer;

use bytes::Bytes;

use crate::error::Result;
use crate::sample::CodecKind;

/// Codec-specific RTP depacketization
pub trait Depacketizer: Send {
    /// Strip the payload descriptor from one RTP payload and return the
    /// codec bytes it carries. May buffer internally (H264 FU-A) and
    /// return an empty chunk until a fragment completes.
    fn depacketize(&mut self, payload: &[u8]) -> Result<Bytes>;

    /// Whether a packet with this payload can begin a new partition
    fn is_partition_head(&self, payload: &[u8]) -> bool;
}

/// Create the depacketizer for a codec.
///
/// Returns `None` for codecs without one; a builder over such a track
/// never produces samples.
pub fn depacketizer_for(codec: CodecKind) -> Option<Box<dyn Depacketizer>> {
    match codec {
        CodecKind::Opus => Some(Box::new(OpusDepacketizer::new())),
        CodecKind::Vp8 => Some(Box::new(Vp8Depacketizer::new())),
        CodecKind::Vp9 => Some(Box::new(Vp9Depacketizer::new())),
        CodecKind::H264 => Some(Box::new(H264Depacketizer::new())),
        CodecKind::Binary => None,
    }
}
