//! Core media handling for avflow: rebuilding codec frames from RTP
//! packet streams and fanning them out through a graph of processing
//! elements.
//!
//! The pieces fit together like this: a [`SampleBuilder`] owns one remote
//! track, feeds its packets through a codec [`payload::Depacketizer`] and
//! the reordering [`SampleSequencer`], and delivers the reconstructed
//! [`Sample`]s to every attached [`Element`]. Elements are resolved at
//! runtime through an [`ElementRegistry`]; the [`mux::WebmSaver`] is the
//! stock recording element.

pub mod builder;
pub mod element;
pub mod error;
pub mod mux;
pub mod payload;
pub mod sample;
pub mod sequencer;
pub mod track;

pub use builder::SampleBuilder;
pub use element::{register_stock_elements, Element, ElementRegistry, Node};
pub use error::{MediaError, Result};
pub use sample::{CodecKind, MediaKind, Sample};
pub use sequencer::{Frame, SampleSequencer};
pub use track::RemoteTrack;
