//! WebM container muxing
//!
//! A hand-rolled EBML writer keeps the dependency surface flat: the
//! container needs only a fixed four-track table, SimpleBlocks in
//! clusters, and streaming (unknown-size) segments.

mod ebml;
pub mod webm;
pub mod writer;

pub use webm::{SampleWriter, WebmSaver, WebmSaverConfig};
pub use writer::{AudioSpec, BlockWriter, TrackSpec, VideoSpec};
