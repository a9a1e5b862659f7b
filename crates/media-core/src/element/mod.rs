//! Processing elements and the element registry
//!
//! An element is a unit of processing behavior attachable to a sample
//! stream. Elements form a fan-out tree: composite nodes forward each
//! sample to their children in attach order and cascade `close` exactly
//! once. Concrete element types are resolved at runtime through the
//! [`ElementRegistry`], which is populated once at process start and
//! injected wherever elements need to be built.

pub mod filewriter;
pub mod filter;
pub mod map;
pub mod multiplexer;

pub use filewriter::{FileWriter, FileWriterConfig};
pub use filter::Filter;
pub use map::Map;
pub use multiplexer::Multiplexer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{MediaError, Result};
use crate::sample::Sample;

/// A unit of media-processing behavior
pub trait Element: Send + Sync + std::fmt::Debug {
    /// Stable identity string; empty when the element has none
    fn id(&self) -> String {
        String::new()
    }

    /// Deliver one sample
    fn write(&self, sample: &Sample) -> Result<()>;

    /// Add a child element receiving this element's output
    fn attach(&self, element: Arc<dyn Element>) -> Result<()>;

    /// Release resources and close children; must be safe to call more
    /// than once
    fn close(&self);
}

/// Composite node with unlimited ordered fan-out
///
/// The default building block for elements that own children: writes go
/// to every child in attach order, close cascades once.
pub struct Node {
    children: RwLock<Vec<Arc<dyn Element>>>,
    closed: AtomicBool,
}

impl Node {
    pub fn new() -> Self {
        Self {
            children: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Forward a sample to every child, stopping at the first error
    pub fn write_children(&self, sample: &Sample) -> Result<()> {
        let children = self.children.read().clone();
        for child in children {
            child.write(sample)?;
        }
        Ok(())
    }

    /// Append a child
    pub fn attach_child(&self, element: Arc<dyn Element>) {
        self.children.write().push(element);
    }

    /// Close every child exactly once
    pub fn close_children(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let children = std::mem::take(&mut *self.children.write());
        for child in children {
            child.close();
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").finish_non_exhaustive()
    }
}

impl Element for Node {
    fn write(&self, sample: &Sample) -> Result<()> {
        self.write_children(sample)
    }

    fn attach(&self, element: Arc<dyn Element>) -> Result<()> {
        self.attach_child(element);
        Ok(())
    }

    fn close(&self) {
        self.close_children();
    }
}

/// Builds an element for a (session, process, track) triple from opaque
/// configuration bytes
pub type ElementFactory =
    Box<dyn Fn(&str, &str, &str, &[u8]) -> Result<Arc<dyn Element>> + Send + Sync>;

/// Registry of element factories keyed by type identifier
///
/// Populated during process initialization, then shared immutably (wrap
/// it in an `Arc` and hand it to the session layer).
pub struct ElementRegistry {
    elements: HashMap<String, ElementFactory>,
}

impl ElementRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
        }
    }

    /// Register a factory under a type identifier
    pub fn register(&mut self, type_id: impl Into<String>, factory: ElementFactory) {
        self.elements.insert(type_id.into(), factory);
    }

    /// Whether a factory is registered for the identifier
    pub fn contains(&self, type_id: &str) -> bool {
        self.elements.contains_key(type_id)
    }

    /// Build an element of the given type
    pub fn create(
        &self,
        type_id: &str,
        session_id: &str,
        process_id: &str,
        track_id: &str,
        config: &[u8],
    ) -> Result<Arc<dyn Element>> {
        let factory = self
            .elements
            .get(type_id)
            .ok_or_else(|| MediaError::element_not_found(type_id))?;
        factory(session_id, process_id, track_id, config)
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the stock element types under their canonical identifiers.
///
/// Configuration payloads are JSON: [`FileWriterConfig`] for
/// `"filewriter"`, [`crate::mux::WebmSaverConfig`] for `"webmsaver"`.
pub fn register_stock_elements(registry: &mut ElementRegistry) {
    registry.register(
        "webmsaver",
        Box::new(|_sid, _pid, _tid, config| {
            let config: crate::mux::WebmSaverConfig = parse_config(config)?;
            let element: Arc<dyn Element> = Arc::new(crate::mux::WebmSaver::new(config));
            Ok(element)
        }),
    );
    registry.register(
        "filewriter",
        Box::new(|_sid, _pid, _tid, config| {
            let config: FileWriterConfig = parse_config(config)?;
            let element: Arc<dyn Element> = Arc::new(FileWriter::new(config)?);
            Ok(element)
        }),
    );
}

fn parse_config<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| MediaError::invalid_config(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sample::CodecKind;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    /// Element that records writes and closes, for pipeline tests
    pub(crate) struct CountingElement {
        pub id: String,
        pub writes: AtomicUsize,
        pub closes: AtomicUsize,
        pub sequences: parking_lot::Mutex<Vec<u16>>,
    }

    impl CountingElement {
        pub fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                writes: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                sequences: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    impl std::fmt::Debug for CountingElement {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CountingElement")
                .field("id", &self.id)
                .finish_non_exhaustive()
        }
    }

    impl Element for CountingElement {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn write(&self, sample: &Sample) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.sequences.lock().push(sample.sequence_number);
            Ok(())
        }

        fn attach(&self, _element: Arc<dyn Element>) -> Result<()> {
            Err(MediaError::AttachNotSupported)
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample(seq: u16) -> Sample {
        Sample {
            track_id: "t".to_string(),
            codec: CodecKind::Opus,
            timestamp: seq as u32 * 960,
            sequence_number: seq,
            prev_dropped_packets: 0,
            payload: Bytes::from_static(&[0x01]),
        }
    }

    #[test]
    fn test_node_fans_out_in_attach_order() {
        let node = Node::new();
        let first = CountingElement::new("first");
        let second = CountingElement::new("second");
        node.attach_child(first.clone());
        node.attach_child(second.clone());

        node.write_children(&sample(0)).unwrap();
        node.write_children(&sample(1)).unwrap();

        assert_eq!(first.writes.load(Ordering::SeqCst), 2);
        assert_eq!(second.writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_node_closes_children_once() {
        let node = Node::new();
        let child = CountingElement::new("child");
        node.attach_child(child.clone());

        node.close_children();
        node.close_children();

        assert_eq!(child.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_create() {
        let mut registry = ElementRegistry::new();
        registry.register(
            "counter",
            Box::new(|_sid, pid, _tid, _config| {
                let element: Arc<dyn Element> = CountingElement::new(pid);
                Ok(element)
            }),
        );

        assert!(registry.contains("counter"));
        let element = registry.create("counter", "s1", "p1", "t1", &[]).unwrap();
        assert_eq!(element.id(), "p1");
    }

    #[test]
    fn test_registry_unknown_type() {
        let registry = ElementRegistry::new();
        let err = registry.create("nope", "s1", "p1", "t1", &[]).unwrap_err();
        assert!(matches!(err, MediaError::ElementNotFound { .. }));
    }

    #[test]
    fn test_stock_webmsaver_factory() {
        let mut registry = ElementRegistry::new();
        register_stock_elements(&mut registry);

        let element = registry
            .create("webmsaver", "s1", "p1", "t1", br#"{"id": "p1"}"#)
            .unwrap();
        assert_eq!(element.id(), "p1");
    }

    #[test]
    fn test_stock_factory_rejects_malformed_config() {
        let mut registry = ElementRegistry::new();
        register_stock_elements(&mut registry);

        let err = registry
            .create("webmsaver", "s1", "p1", "t1", b"not json")
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidConfig { .. }));
    }
}
