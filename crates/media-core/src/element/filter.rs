//! Predicate-gated fan-out element

use std::sync::Arc;

use tracing::debug;

use super::{Element, Node};
use crate::error::Result;
use crate::sample::Sample;

/// Condition deciding whether a sample passes the filter
pub type FilterFn = Box<dyn Fn(&Sample) -> bool + Send + Sync>;

/// Element that forwards a sample to its children only when the
/// condition holds
pub struct Filter {
    id: String,
    condition: FilterFn,
    node: Node,
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Filter {
    pub fn new(id: impl Into<String>, condition: FilterFn) -> Self {
        let id = id.into();
        debug!("new filter with id: {}", id);
        Self {
            id,
            condition,
            node: Node::new(),
        }
    }
}

impl Element for Filter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn write(&self, sample: &Sample) -> Result<()> {
        if (self.condition)(sample) {
            self.node.write_children(sample)?;
        }
        Ok(())
    }

    fn attach(&self, element: Arc<dyn Element>) -> Result<()> {
        self.node.attach_child(element);
        Ok(())
    }

    fn close(&self) {
        self.node.close_children();
    }
}
