//! Per-session track and process management
//!
//! A session owns one peer transport. Remote tracks become sample
//! builders; `process` requests bind registry-built elements onto those
//! builders, queueing when the track has not arrived yet. When the last
//! builder stops and nothing is pending, the session tears itself down.
//!
//! The builders/pending/processes maps share one reader/writer lock.
//! Lookups on the hot path take the read side; topology changes take the
//! write side. The lock is never held while an element's `write` runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time;
use tracing::{debug, error, info};

use avflow_media_core::element::{Element, ElementRegistry};
use avflow_media_core::sample::MediaKind;
use avflow_media_core::track::RemoteTrack;
use avflow_media_core::SampleBuilder;
use avflow_rtp_core::RtcpPictureLossIndication;

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::transport::{PeerTransport, TransportEvent};

/// Callback invoked exactly once when the session closes
pub type OnCloseFn = Box<dyn FnOnce() + Send>;

/// Per-session tuning derived from the node [`Config`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub audio_max_late: usize,
    pub video_max_late: usize,
    pub pli_cycle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            audio_max_late: config.sample_builder.audio_max_late,
            video_max_late: config.sample_builder.video_max_late,
            pli_cycle: Duration::from_millis(config.webrtc.pli_cycle_ms),
        }
    }
}

struct PendingProcess {
    process_id: String,
    factory: Box<dyn FnOnce() -> avflow_media_core::Result<Arc<dyn Element>> + Send + Sync>,
}

#[derive(Default)]
struct SessionInner {
    /// One builder per observed track
    builders: HashMap<String, Arc<SampleBuilder>>,

    /// Element constructors queued for tracks that have not arrived
    pending: HashMap<String, Vec<PendingProcess>>,

    /// Instantiated process elements, shared across tracks by process id
    processes: HashMap<String, Arc<dyn Element>>,
}

/// One media session bound to one peer transport
pub struct MediaSession {
    id: String,
    transport: Arc<dyn PeerTransport>,
    registry: Arc<ElementRegistry>,
    config: SessionConfig,
    inner: RwLock<SessionInner>,
    on_close: Mutex<Option<OnCloseFn>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MediaSession {
    /// Create a session and start consuming the transport's events
    pub fn new(
        id: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
        registry: Arc<ElementRegistry>,
        config: SessionConfig,
    ) -> Result<Arc<Self>> {
        let id = id.into();
        let mut events = transport
            .take_event_receiver()
            .ok_or_else(|| SessionError::transport("transport event stream already taken"))?;

        let session = Arc::new(Self {
            id,
            transport: transport.clone(),
            registry,
            config: config.clone(),
            inner: RwLock::new(SessionInner::default()),
            on_close: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&session);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                match event {
                    TransportEvent::TrackAdded(track) => session.handle_track(track).await,
                    TransportEvent::Closed => {
                        session.close();
                        return;
                    }
                }
            }
        });

        if !config.pli_cycle.is_zero() {
            tokio::spawn(Self::pli_loop(
                Arc::downgrade(&session),
                transport,
                config.pli_cycle,
            ));
        }

        Ok(session)
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register the close callback (used by the owner to release the
    /// upstream connection and deregister the session)
    pub fn on_close(&self, f: impl FnOnce() + Send + 'static) {
        *self.on_close.lock() = Some(Box::new(f));
    }

    /// Bind a processing element to a track.
    ///
    /// If the track's builder exists the element is attached right away;
    /// otherwise the request is queued and resolved on track arrival, in
    /// request order. Requests naming the same `process_id` share one
    /// element instance, including across different tracks (multi-track
    /// fan-in into one process). An unknown `element_type` fails the
    /// request without touching any state.
    pub fn process(
        &self,
        process_id: &str,
        track_id: &str,
        element_type: &str,
        config: &[u8],
    ) -> Result<()> {
        info!("MediaSession.process id={}", process_id);

        let mut inner = self.inner.write();

        if !self.registry.contains(element_type) {
            error!("element not found: {}", element_type);
            return Err(SessionError::Media(
                avflow_media_core::MediaError::element_not_found(element_type),
            ));
        }

        let Some(builder) = inner.builders.get(track_id).cloned() else {
            debug!("builder not found for track {}. queuing.", track_id);
            let registry = self.registry.clone();
            let sid = self.id.clone();
            let pid = process_id.to_string();
            let tid = track_id.to_string();
            let eid = element_type.to_string();
            let config = config.to_vec();
            inner
                .pending
                .entry(track_id.to_string())
                .or_default()
                .push(PendingProcess {
                    process_id: process_id.to_string(),
                    factory: Box::new(move || registry.create(&eid, &sid, &pid, &tid, &config)),
                });
            return Ok(());
        };

        let process = match inner.processes.get(process_id) {
            Some(element) => element.clone(),
            None => {
                let element =
                    self.registry
                        .create(element_type, &self.id, process_id, track_id, config)?;
                inner
                    .processes
                    .insert(process_id.to_string(), element.clone());
                element
            }
        };
        drop(inner);

        builder.attach_element(process);
        Ok(())
    }

    /// Whether the session holds no builders and no pending requests
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.builders.is_empty() && inner.pending.is_empty()
    }

    /// Close the session: fire the close callback and shut the transport.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing session: {}", self.id);

        let on_close = self.on_close.lock().take();
        if let Some(callback) = on_close {
            callback();
        }

        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.close().await {
                error!("error closing transport: {}", e);
            }
        });
    }

    /// Human-readable dump of this session for diagnostics
    pub fn stats(&self) -> String {
        let inner = self.inner.read();
        let mut info = format!("  session: {}\n", self.id);
        for builder in inner.builders.values() {
            info += &builder.stats();
        }
        for track_id in inner.pending.keys() {
            info += &format!("      pending track: {}\n", track_id);
        }
        info
    }

    async fn handle_track(self: &Arc<Self>, track: Arc<dyn RemoteTrack>) {
        let track_id = track.id();
        info!("got track: {}", track_id);

        let kind = track.codec().kind();
        let ssrc = track.ssrc();
        let max_late = match kind {
            MediaKind::Audio => self.config.audio_max_late,
            _ => self.config.video_max_late,
        };

        let builder = SampleBuilder::new(track, max_late);

        {
            let mut inner = self.inner.write();
            inner.builders.insert(track_id.clone(), builder.clone());

            // resolve queued process requests in arrival order
            if let Some(pending) = inner.pending.remove(&track_id) {
                for request in pending {
                    let process = match inner.processes.get(&request.process_id) {
                        Some(element) => element.clone(),
                        None => match (request.factory)() {
                            Ok(element) => {
                                inner
                                    .processes
                                    .insert(request.process_id.clone(), element.clone());
                                element
                            }
                            Err(e) => {
                                error!("error building pending element: {}", e);
                                continue;
                            }
                        },
                    };
                    builder.attach_element(process);
                }
            }
        }

        let weak = Arc::downgrade(self);
        let stopped_track = track_id.clone();
        builder.on_stop(move || {
            if let Some(session) = weak.upgrade() {
                session.handle_builder_stopped(&stopped_track);
            }
        });

        if kind == MediaKind::Video {
            let pli = RtcpPictureLossIndication::new(ssrc, ssrc);
            if let Err(e) = self.transport.write_rtcp(&[pli]).await {
                error!("error writing pli: {}", e);
            }
        }
    }

    fn handle_builder_stopped(&self, track_id: &str) {
        {
            let mut inner = self.inner.write();
            if inner.builders.remove(track_id).is_some() {
                debug!("stop builder {}", track_id);
            }
        }

        if self.is_empty() {
            // no more tracks, clean up the session
            self.close();
        }
    }

    async fn pli_loop(
        session: Weak<MediaSession>,
        transport: Arc<dyn PeerTransport>,
        cycle: Duration,
    ) {
        let mut ticker = time::interval(cycle);
        // consume the immediate first tick so the loop runs on the cycle
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(session) = session.upgrade() else {
                return;
            };

            let packets: Vec<RtcpPictureLossIndication> = {
                let inner = session.inner.read();
                inner
                    .builders
                    .values()
                    .filter(|b| b.track().codec().kind() == MediaKind::Video)
                    .map(|b| {
                        let ssrc = b.track().ssrc();
                        RtcpPictureLossIndication::new(ssrc, ssrc)
                    })
                    .collect()
            };

            if packets.is_empty() {
                // self-terminates with the last video builder; a video
                // track arriving later does not restart the loop
                return;
            }

            if let Err(e) = transport.write_rtcp(&packets).await {
                error!("error writing pli: {}", e);
            }
        }
    }
}
