//! Node-level session aggregate
//!
//! One `MediaNode` per process: it owns every media session, injects the
//! element registry into them, routes `process` requests, and logs a
//! periodic human-readable dump of what is flowing where. The dump is
//! operational visibility only; nothing parses it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time;
use tracing::{debug, info};

use avflow_media_core::element::ElementRegistry;

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::session::{MediaSession, SessionConfig};
use crate::transport::PeerTransport;

const STAT_CYCLE: Duration = Duration::from_secs(5);

/// Process-wide owner of media sessions
pub struct MediaNode {
    config: Config,
    registry: Arc<ElementRegistry>,
    sessions: RwLock<HashMap<String, Arc<MediaSession>>>,
}

impl MediaNode {
    /// Create a node with an already-populated element registry
    pub fn new(config: Config, registry: Arc<ElementRegistry>) -> Arc<Self> {
        let node = Arc::new(Self {
            config,
            registry,
            sessions: RwLock::new(HashMap::new()),
        });

        tokio::spawn(Self::stats_loop(Arc::downgrade(&node)));

        node
    }

    /// Create and register a session over the given transport.
    ///
    /// The session deregisters itself from this node when it closes.
    pub fn new_session(
        self: &Arc<Self>,
        id: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Arc<MediaSession>> {
        let id = id.into();
        if self.sessions.read().contains_key(&id) {
            return Err(SessionError::session_exists(id));
        }

        let session = MediaSession::new(
            id.clone(),
            transport,
            self.registry.clone(),
            SessionConfig::from(&self.config),
        )?;

        let weak = Arc::downgrade(self);
        let session_id = id.clone();
        session.on_close(move || {
            if let Some(node) = weak.upgrade() {
                node.sessions.write().remove(&session_id);
                debug!("session removed: {}", session_id);
            }
        });

        self.sessions.write().insert(id, session.clone());
        Ok(session)
    }

    /// Look up a session by id
    pub fn session(&self, id: &str) -> Option<Arc<MediaSession>> {
        self.sessions.read().get(id).cloned()
    }

    /// Route a processing request to a session
    pub fn process(
        &self,
        session_id: &str,
        process_id: &str,
        track_id: &str,
        element_type: &str,
        config: &[u8],
    ) -> Result<()> {
        let session = self
            .session(session_id)
            .ok_or_else(|| SessionError::session_not_found(session_id))?;
        session.process(process_id, track_id, element_type, config)
    }

    /// Human-readable dump of every session
    pub fn stats(&self) -> String {
        let sessions = self.sessions.read();
        let mut info = String::from("\n----------------stats-----------------\n");
        for session in sessions.values() {
            info += &session.stats();
        }
        info
    }

    async fn stats_loop(node: Weak<MediaNode>) {
        let mut ticker = time::interval(STAT_CYCLE);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(node) = node.upgrade() else {
                return;
            };
            if node.sessions.read().is_empty() {
                continue;
            }
            info!("{}", node.stats());
        }
    }
}
