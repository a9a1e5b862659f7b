//! Multiplexing element
//!
//! A multiplexer lets several producers share one downstream element
//! (typically an expensive one) while keeping their output apart: each
//! multiplexer stamps the samples it forwards with a unique origin id,
//! and a filter attached to the shared element demultiplexes that origin
//! back out to this multiplexer's own children.

use std::sync::Arc;

use uuid::Uuid;

use super::{Element, Filter};
use crate::error::Result;
use crate::sample::Sample;

pub struct Multiplexer {
    id: String,
    target: Arc<dyn Element>,
    demux: Arc<Filter>,
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Multiplexer {
    /// Wrap a shared element; fails when the element refuses children
    pub fn new(target: Arc<dyn Element>) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        let origin = id.clone();
        let demux = Arc::new(Filter::new(
            id.clone(),
            Box::new(move |sample: &Sample| sample.track_id == origin),
        ));
        target.attach(demux.clone())?;
        Ok(Self { id, target, demux })
    }
}

impl Element for Multiplexer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn write(&self, sample: &Sample) -> Result<()> {
        let mut stamped = sample.clone();
        stamped.track_id = self.id.clone();
        self.target.write(&stamped)
    }

    fn attach(&self, element: Arc<dyn Element>) -> Result<()> {
        self.demux.attach(element)
    }

    fn close(&self) {
        self.demux.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::tests::CountingElement;
    use crate::element::Node;
    use crate::sample::CodecKind;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_multiplexer_demuxes_by_origin() {
        let shared: Arc<dyn Element> = Arc::new(Node::new());
        let mux_a = Multiplexer::new(shared.clone()).unwrap();
        let mux_b = Multiplexer::new(shared).unwrap();

        let sink_a = CountingElement::new("a");
        let sink_b = CountingElement::new("b");
        mux_a.attach(sink_a.clone()).unwrap();
        mux_b.attach(sink_b.clone()).unwrap();

        let sample = Sample {
            track_id: "source".to_string(),
            codec: CodecKind::Opus,
            timestamp: 0,
            sequence_number: 0,
            prev_dropped_packets: 0,
            payload: Bytes::from_static(&[0x01]),
        };

        mux_a.write(&sample).unwrap();
        mux_a.write(&sample).unwrap();
        mux_b.write(&sample).unwrap();

        assert_eq!(sink_a.writes.load(Ordering::SeqCst), 2);
        assert_eq!(sink_b.writes.load(Ordering::SeqCst), 1);
    }
}
