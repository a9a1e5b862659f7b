//! Sample-transforming fan-out element

use std::sync::Arc;

use super::{Element, Node};
use crate::error::Result;
use crate::sample::Sample;

/// Transformation applied to each sample before fan-out
pub type MapFn = Box<dyn Fn(&Sample) -> Sample + Send + Sync>;

/// Element that maps samples through a function before forwarding them
pub struct Map {
    transform: MapFn,
    node: Node,
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map").finish_non_exhaustive()
    }
}

impl Map {
    pub fn new(transform: MapFn) -> Self {
        Self {
            transform,
            node: Node::new(),
        }
    }
}

impl Element for Map {
    fn write(&self, sample: &Sample) -> Result<()> {
        let mapped = (self.transform)(sample);
        self.node.write_children(&mapped)
    }

    fn attach(&self, element: Arc<dyn Element>) -> Result<()> {
        self.node.attach_child(element);
        Ok(())
    }

    fn close(&self) {
        self.node.close_children();
    }
}
