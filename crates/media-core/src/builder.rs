//! Sample builder: one per remote track
//!
//! Two loops run for the lifetime of the track. The packet loop blocks on
//! the transport for the next RTP packet, feeds the sequencer, and pushes
//! every completed frame onto a bounded queue; when the queue is full the
//! `send` suspends, which in turn suspends the packet read. That bounded
//! queue is the pipeline's only flow-control mechanism. The forward loop
//! drains the queue and writes each sample to every attached element,
//! isolating element failures from each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::element::Element;
use crate::error::MediaError;
use crate::payload;
use crate::sample::Sample;
use crate::sequencer::SampleSequencer;
use crate::track::RemoteTrack;

/// Capacity of the bounded output queue between reassembly and fan-out
const OUT_QUEUE_SIZE: usize = 100;

/// Callback invoked exactly once when the builder stops
pub type OnStopFn = Box<dyn FnOnce() + Send>;

/// Builds ordered samples from one track's RTP stream and fans them out
/// to attached elements
pub struct SampleBuilder {
    track: Arc<dyn RemoteTrack>,
    stopped: AtomicBool,
    elements: Mutex<Vec<Arc<dyn Element>>>,
    on_stop: Mutex<Option<OnStopFn>>,
}

impl SampleBuilder {
    /// Create a builder and start its loops
    ///
    /// `max_late` bounds the out-of-order tolerance window in packets.
    pub fn new(track: Arc<dyn RemoteTrack>, max_late: usize) -> Arc<Self> {
        let builder = Arc::new(Self {
            track,
            stopped: AtomicBool::new(false),
            elements: Mutex::new(Vec::new()),
            on_stop: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel(OUT_QUEUE_SIZE);
        tokio::spawn(Self::packet_loop(builder.clone(), tx, max_late));
        tokio::spawn(Self::forward_loop(builder.clone(), rx));

        builder
    }

    /// The underlying track
    pub fn track(&self) -> &Arc<dyn RemoteTrack> {
        &self.track
    }

    /// Attach an element; it starts receiving samples from the next
    /// fan-out cycle onward (no historical replay)
    pub fn attach_element(&self, element: Arc<dyn Element>) {
        self.elements.lock().push(element);
    }

    /// Register the stop callback (used by the owning session to remove
    /// the builder from its map)
    pub fn on_stop(&self, f: impl FnOnce() + Send + 'static) {
        *self.on_stop.lock() = Some(Box::new(f));
    }

    /// Whether the builder has stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the builder: close every attached element and fire the stop
    /// callback. Idempotent; later calls are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("stopping builder for track: {}", self.track.id());

        let elements = std::mem::take(&mut *self.elements.lock());
        for element in &elements {
            element.close();
        }

        let on_stop = self.on_stop.lock().take();
        if let Some(callback) = on_stop {
            callback();
        }
    }

    /// Human-readable dump of this builder for diagnostics
    pub fn stats(&self) -> String {
        let mut info = format!("      track: {}\n", self.track.id());
        for element in self.elements.lock().iter() {
            info += &format!("        element: {}\n", element.id());
        }
        info
    }

    async fn packet_loop(builder: Arc<SampleBuilder>, tx: mpsc::Sender<Sample>, max_late: usize) {
        let track = builder.track.clone();
        let track_id = track.id();
        let codec = track.codec();
        debug!("reading rtp for track: {}", track_id);

        let Some(depacketizer) = payload::depacketizer_for(codec) else {
            // no depacketizer: keep the transport drained but never
            // produce a sample
            debug!(
                "no depacketizer for codec {}; track {} produces no samples",
                codec.name(),
                track_id
            );
            loop {
                if builder.is_stopped() {
                    return;
                }
                if track.read_rtp().await.is_err() {
                    builder.stop();
                    return;
                }
            }
        };

        let mut sequencer = SampleSequencer::new(depacketizer, max_late);
        let mut sequence: u16 = 0;

        loop {
            if builder.is_stopped() {
                return;
            }

            let packet = match track.read_rtp().await {
                Ok(packet) => packet,
                Err(MediaError::EndOfStream) => {
                    debug!("track {} reached end of stream", track_id);
                    builder.stop();
                    return;
                }
                Err(e) => {
                    error!("error reading track rtp: {}", e);
                    builder.stop();
                    return;
                }
            };

            sequencer.push(packet);

            while let Some(frame) = sequencer.pop() {
                let sample = Sample {
                    track_id: track_id.clone(),
                    codec,
                    timestamp: frame.timestamp,
                    sequence_number: sequence,
                    prev_dropped_packets: frame.prev_dropped_packets,
                    payload: frame.data,
                };
                sequence = sequence.wrapping_add(1);
                if tx.send(sample).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn forward_loop(builder: Arc<SampleBuilder>, mut rx: mpsc::Receiver<Sample>) {
        while let Some(sample) = rx.recv().await {
            if builder.is_stopped() {
                return;
            }

            // snapshot outside the lock so a slow element cannot block
            // attach or stop
            let elements = builder.elements.lock().clone();
            for element in elements {
                if let Err(e) = element.write(&sample) {
                    error!("error writing sample: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::tests::CountingElement;
    use crate::sample::CodecKind;
    use async_trait::async_trait;
    use avflow_rtp_core::{RtpHeader, RtpPacket, RtpSsrc};
    use bytes::Bytes;
    use std::time::Duration;

    pub(crate) struct MockTrack {
        id: String,
        codec: CodecKind,
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RtpPacket>>,
    }

    impl MockTrack {
        pub fn new(
            id: &str,
            codec: CodecKind,
        ) -> (Arc<Self>, mpsc::UnboundedSender<RtpPacket>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    id: id.to_string(),
                    codec,
                    rx: tokio::sync::Mutex::new(rx),
                }),
                tx,
            )
        }
    }

    #[async_trait]
    impl RemoteTrack for MockTrack {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn codec(&self) -> CodecKind {
            self.codec
        }

        fn ssrc(&self) -> RtpSsrc {
            0x1234
        }

        async fn read_rtp(&self) -> crate::error::Result<RtpPacket> {
            self.rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(MediaError::EndOfStream)
        }
    }

    fn opus_packet(seq: u16, ts: u32) -> RtpPacket {
        RtpPacket::new(
            RtpHeader::new(111, seq, ts, 0x1234),
            Bytes::from_static(&[0xAB, 0xCD]),
        )
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_builder_delivers_ordered_samples() {
        let (track, tx) = MockTrack::new("audio-0", CodecKind::Opus);
        let builder = SampleBuilder::new(track, 50);

        let sink = CountingElement::new("sink");
        builder.attach_element(sink.clone());

        for seq in 0u16..6 {
            tx.send(opus_packet(seq, seq as u32 * 960)).unwrap();
        }

        // the last frame never completes without a successor packet
        wait_until(|| sink.writes.load(Ordering::SeqCst) == 5).await;

        // end of stream stops the builder
        drop(tx);
        wait_until(|| builder.is_stopped()).await;

        let sequences = sink.sequences.lock().clone();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_once() {
        let (track, _tx) = MockTrack::new("audio-1", CodecKind::Opus);
        let builder = SampleBuilder::new(track, 50);

        let sink = CountingElement::new("sink");
        builder.attach_element(sink.clone());

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        builder.on_stop(move || {
            fired_clone.store(true, Ordering::SeqCst);
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let b = builder.clone();
            handles.push(tokio::spawn(async move { b.stop() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unsupported_codec_produces_no_samples() {
        let (track, tx) = MockTrack::new("data-0", CodecKind::Binary);
        let builder = SampleBuilder::new(track, 50);

        let sink = CountingElement::new("sink");
        builder.attach_element(sink.clone());

        tx.send(opus_packet(0, 0)).unwrap();
        tx.send(opus_packet(1, 960)).unwrap();
        drop(tx);

        wait_until(|| builder.is_stopped()).await;

        assert_eq!(sink.writes.load(Ordering::SeqCst), 0);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_stats_lists_track_and_elements() {
        let (track, _tx) = MockTrack::new("audio-2", CodecKind::Opus);
        let builder = SampleBuilder::new(track, 50);
        builder.attach_element(CountingElement::new("rec"));

        let stats = builder.stats();
        assert!(stats.contains("track: audio-2"));
        assert!(stats.contains("element: rec"));
    }
}
