//! WebM recording element
//!
//! Buffers incoming samples until a VP8 keyframe reveals the frame
//! dimensions (or the buffer cap forces defaults), then serializes
//! interleaved Opus/VP8 blocks plus dropped-packet metadata into a WebM
//! stream. The serialized bytes are fanned out to attached child
//! elements as binary samples, so a file writer child persists the file.

use std::io::{self, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::writer::{
    AudioSpec, BlockWriter, TrackSpec, VideoSpec, TRACK_TYPE_AUDIO, TRACK_TYPE_METADATA,
    TRACK_TYPE_VIDEO,
};
use crate::element::{Element, Node};
use crate::error::Result;
use crate::payload::vp8;
use crate::sample::{CodecKind, Sample};

/// Dimensions used when no usable keyframe was seen
pub const DEFAULT_WIDTH: u32 = 640;
/// Dimensions used when no usable keyframe was seen
pub const DEFAULT_HEIGHT: u32 = 480;

// 60 FPS for 15 seconds
const MAX_BUFFERED_SAMPLES: usize = 60 * 15;

// maximum tolerated audio/video interleave skew
const MAX_SYNC_DELAY_MS: i64 = 15_000;

const AUDIO_META_TRACK: u64 = 1;
const AUDIO_TRACK: u64 = 2;
const VIDEO_META_TRACK: u64 = 3;
const VIDEO_TRACK: u64 = 4;

// RTP clock ticks per millisecond
const OPUS_TICKS_PER_MS: u32 = 48;
const VP8_TICKS_PER_MS: u32 = 90;

/// Configuration for a [`WebmSaver`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebmSaverConfig {
    /// Element identity
    pub id: String,
}

#[derive(Debug, Default)]
struct SaverStats {
    audio: u64,
    video_key: u64,
    video_inter: u64,
    dropped_audio: u64,
    dropped_video: u64,
    unknown: u64,
}

struct SaverState {
    closed: bool,
    pre_buffer: Option<Vec<Sample>>,
    writer: Option<BlockWriter<SampleWriterHandle>>,
    audio_origin: Option<u32>,
    video_origin: Option<u32>,
    stats_context: String,
    pre_buffer_stats: SaverStats,
    live_stats: SaverStats,
}

/// Element saving an audio/video sample stream to WebM
pub struct WebmSaver {
    id: String,
    sample_writer: Arc<SampleWriter>,
    state: Mutex<SaverState>,
    write_in_progress: AtomicI32,
}

impl std::fmt::Debug for WebmSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebmSaver")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl WebmSaver {
    /// Create a saver; nothing is written until the pre-buffer resolves
    pub fn new(config: WebmSaverConfig) -> Self {
        Self {
            id: config.id,
            sample_writer: Arc::new(SampleWriter::new()),
            state: Mutex::new(SaverState {
                closed: false,
                pre_buffer: Some(Vec::with_capacity(MAX_BUFFERED_SAMPLES)),
                writer: None,
                audio_origin: None,
                video_origin: None,
                stats_context: String::new(),
                pre_buffer_stats: SaverStats::default(),
                live_stats: SaverStats::default(),
            }),
            write_in_progress: AtomicI32::new(0),
        }
    }

    /// Set the context string shown with periodic stat log lines; stats
    /// are skipped entirely while it is empty
    pub fn set_stats_context(&self, context: impl Into<String>) {
        self.state.lock().stats_context = context.into();
    }

    fn process_sample(&self, st: &mut SaverState, sample: Option<&Sample>) -> Result<()> {
        if self.handle_pre_buffer(st, sample)? {
            return Ok(());
        }
        let Some(sample) = sample else {
            return Ok(());
        };

        let context = st.stats_context.clone();
        Self::handle_stats(&context, &mut st.live_stats, Some(sample));

        match sample.codec {
            CodecKind::Vp8 => {
                if sample.prev_dropped_packets > 0 {
                    self.push_video_dropped(st, sample);
                }
                self.push_vp8(st, sample);
            }
            CodecKind::Opus => {
                if sample.prev_dropped_packets > 0 {
                    self.push_audio_dropped(st, sample);
                }
                self.push_opus(st, sample);
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns true while the pre-buffer is still absorbing samples.
    /// The buffer resolves on the first parseable VP8 keyframe, when the
    /// cap is hit, or at close (`sample` is `None`), whichever comes
    /// first.
    fn handle_pre_buffer(&self, st: &mut SaverState, sample: Option<&Sample>) -> Result<bool> {
        if st.pre_buffer.is_none() {
            return Ok(false);
        }

        let context = st.stats_context.clone();
        Self::handle_stats(&context, &mut st.pre_buffer_stats, sample);

        match sample {
            None => {
                self.init_and_replay(st, DEFAULT_WIDTH, DEFAULT_HEIGHT)?;
            }
            Some(sample) => {
                let at_capacity = {
                    let Some(buffer) = st.pre_buffer.as_mut() else {
                        return Ok(false);
                    };
                    buffer.push(sample.clone());
                    buffer.len() >= MAX_BUFFERED_SAMPLES
                };

                if at_capacity {
                    self.init_and_replay(st, DEFAULT_WIDTH, DEFAULT_HEIGHT)?;
                } else if sample.codec == CodecKind::Vp8 {
                    if let Some((width, height)) = vp8::keyframe_dimensions(&sample.payload) {
                        if width > 0 && height > 0 {
                            self.init_and_replay(st, width, height)?;
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    fn init_and_replay(&self, st: &mut SaverState, width: u32, height: u32) -> Result<()> {
        self.init_writer(st, width, height);
        let buffered = st.pre_buffer.take().unwrap_or_default();
        for sample in &buffered {
            self.process_sample(st, Some(sample))?;
        }
        Ok(())
    }

    fn init_writer(&self, st: &mut SaverState, width: u32, height: u32) {
        let tracks = vec![
            TrackSpec {
                number: AUDIO_META_TRACK,
                uid: 98765,
                name: "VttAudioDroppedPacketMeta".to_string(),
                codec_id: "D_WEBVTT/METADATA".to_string(),
                track_type: TRACK_TYPE_METADATA,
                default_duration_ns: Some(20_000_000),
                audio: None,
                video: None,
            },
            TrackSpec {
                number: AUDIO_TRACK,
                uid: 12345,
                name: "Audio".to_string(),
                codec_id: "A_OPUS".to_string(),
                track_type: TRACK_TYPE_AUDIO,
                default_duration_ns: Some(20_000_000),
                audio: Some(AudioSpec {
                    sampling_frequency: 48_000.0,
                    channels: 2,
                }),
                video: None,
            },
            TrackSpec {
                number: VIDEO_META_TRACK,
                uid: 54321,
                name: "VttVideoDroppedPacketMeta".to_string(),
                codec_id: "D_WEBVTT/METADATA".to_string(),
                track_type: TRACK_TYPE_METADATA,
                default_duration_ns: Some(20_000_000),
                audio: None,
                video: None,
            },
            TrackSpec {
                number: VIDEO_TRACK,
                uid: 67890,
                name: "Video".to_string(),
                codec_id: "V_VP8".to_string(),
                track_type: TRACK_TYPE_VIDEO,
                default_duration_ns: Some(20_000_000),
                audio: None,
                video: Some(VideoSpec {
                    pixel_width: width as u64,
                    pixel_height: height as u64,
                }),
            },
        ];

        let sink = SampleWriterHandle(self.sample_writer.clone());
        match BlockWriter::new(sink, &tracks, MAX_SYNC_DELAY_MS) {
            Ok(writer) => {
                st.writer = Some(writer);
                info!(
                    "webm writer started with video width={}, height={}",
                    width, height
                );
            }
            Err(e) => error!("init writer err: {}", e),
        }
    }

    fn push_opus(&self, st: &mut SaverState, sample: &Sample) {
        let origin = *st.audio_origin.get_or_insert(sample.timestamp);
        let t = sample.timestamp.wrapping_sub(origin) / OPUS_TICKS_PER_MS;
        if let Some(writer) = st.writer.as_mut() {
            if let Err(e) = writer.write_block(AUDIO_TRACK, true, t as i64, &sample.payload) {
                error!("audio writer err: {}", e);
            }
        }
    }

    fn push_vp8(&self, st: &mut SaverState, sample: &Sample) {
        let keyframe = vp8::is_keyframe(&sample.payload);
        let origin = *st.video_origin.get_or_insert(sample.timestamp);
        let t = sample.timestamp.wrapping_sub(origin) / VP8_TICKS_PER_MS;
        if let Some(writer) = st.writer.as_mut() {
            if let Err(e) = writer.write_block(VIDEO_TRACK, keyframe, t as i64, &sample.payload) {
                error!("video writer err: {}", e);
            }
        }
    }

    fn push_audio_dropped(&self, st: &mut SaverState, sample: &Sample) {
        // big-endian u16 count, timestamped at the same relative position
        // as the audio block it precedes
        let meta = sample.prev_dropped_packets.to_be_bytes();
        let origin = st.audio_origin.unwrap_or(sample.timestamp);
        let t = sample.timestamp.wrapping_sub(origin) / OPUS_TICKS_PER_MS;
        if let Some(writer) = st.writer.as_mut() {
            if let Err(e) = writer.write_block(AUDIO_META_TRACK, true, t as i64, &meta) {
                error!("audio meta writer err: {}", e);
            }
        }
    }

    fn push_video_dropped(&self, st: &mut SaverState, sample: &Sample) {
        let meta = sample.prev_dropped_packets.to_be_bytes();
        let origin = st.video_origin.unwrap_or(sample.timestamp);
        let t = sample.timestamp.wrapping_sub(origin) / VP8_TICKS_PER_MS;
        if let Some(writer) = st.writer.as_mut() {
            if let Err(e) = writer.write_block(VIDEO_META_TRACK, true, t as i64, &meta) {
                error!("video meta writer err: {}", e);
            }
        }
    }

    fn handle_stats(context: &str, stats: &mut SaverStats, sample: Option<&Sample>) {
        if context.is_empty() {
            return;
        }

        fn report(value: &mut u64, total: u64, mask: u64, message: &str, context: &str) {
            let was_zero = *value == 0;
            *value += total;
            if was_zero || *value & mask == 0 {
                debug!("webm saver stat: {} for {}, context={}", *value, message, context);
            }
        }

        let Some(sample) = sample else {
            report(&mut stats.unknown, 1, 0xFF, "unknown nil samples", context);
            return;
        };

        match sample.codec {
            CodecKind::Opus => {
                if sample.prev_dropped_packets > 0 {
                    report(
                        &mut stats.dropped_audio,
                        u64::from(sample.prev_dropped_packets),
                        0xFF,
                        "audio dropped",
                        context,
                    );
                }
                report(&mut stats.audio, 1, 0xFF, "audio", context);
            }
            CodecKind::Vp8 => {
                if sample.prev_dropped_packets > 0 {
                    report(
                        &mut stats.dropped_video,
                        u64::from(sample.prev_dropped_packets),
                        0xFF,
                        "video dropped",
                        context,
                    );
                }
                if vp8::is_keyframe(&sample.payload) {
                    report(&mut stats.video_key, 1, 0x3, "video key", context);
                } else {
                    report(&mut stats.video_inter, 1, 0x3F, "video", context);
                }
            }
            _ => report(&mut stats.unknown, 1, 0xFF, "unknown samples", context),
        }
    }
}

impl Element for WebmSaver {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn write(&self, sample: &Sample) -> Result<()> {
        {
            let st = self.state.lock();
            if st.closed {
                // already closed, ignore samples that are pending
                return Ok(());
            }
            self.write_in_progress.fetch_add(1, Ordering::SeqCst);
        }

        let result = {
            let mut st = self.state.lock();
            self.process_sample(&mut st, Some(sample))
        };
        self.write_in_progress.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn attach(&self, element: Arc<dyn Element>) -> Result<()> {
        self.sample_writer.attach(element)
    }

    fn close(&self) {
        // wait for any pending write to complete before sealing the file
        loop {
            {
                let mut st = self.state.lock();
                if st.closed {
                    return;
                }
                if self.write_in_progress.load(Ordering::SeqCst) == 0 {
                    st.closed = true;
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        let mut st = self.state.lock();
        // flush the pre-buffer as end of data
        if let Err(e) = self.process_sample(&mut st, None) {
            error!("close flush err: {}", e);
        }
        if let Some(mut writer) = st.writer.take() {
            if let Err(e) = writer.finalize() {
                error!("finalize err: {}", e);
            }
        }
        drop(st);

        self.sample_writer.close();
    }
}

/// Node fanning the serialized container bytes out as binary samples
pub struct SampleWriter {
    node: Node,
}

impl SampleWriter {
    pub fn new() -> Self {
        Self { node: Node::new() }
    }
}

impl std::fmt::Debug for SampleWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleWriter").finish_non_exhaustive()
    }
}

impl Default for SampleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for SampleWriter {
    fn write(&self, sample: &Sample) -> Result<()> {
        self.node.write_children(sample)
    }

    fn attach(&self, element: Arc<dyn Element>) -> Result<()> {
        self.node.attach_child(element);
        Ok(())
    }

    fn close(&self) {
        self.node.close_children();
    }
}

/// `io::Write` adapter turning container bytes into binary samples
struct SampleWriterHandle(Arc<SampleWriter>);

impl Write for SampleWriterHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let sample = Sample::binary(Bytes::copy_from_slice(buf));
        self.0
            .write(&sample)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use std::sync::atomic::AtomicUsize;

    /// Collects the serialized container bytes
    struct BufWriter {
        buf: Mutex<Vec<u8>>,
        closes: AtomicUsize,
    }

    impl BufWriter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                buf: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
            })
        }

        fn contents(&self) -> Vec<u8> {
            self.buf.lock().clone()
        }
    }

    impl std::fmt::Debug for BufWriter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BufWriter").finish_non_exhaustive()
        }
    }

    impl Element for BufWriter {
        fn write(&self, sample: &Sample) -> Result<()> {
            self.buf.lock().extend_from_slice(&sample.payload);
            Ok(())
        }

        fn attach(&self, _element: Arc<dyn Element>) -> Result<()> {
            Err(MediaError::AttachNotSupported)
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    // depacketized 640x480 VP8 keyframe header
    fn vp8_keyframe() -> Bytes {
        Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x9D, 0x01, 0x2A, 0x80, 0x02, 0xE0, 0x01, 0x00, 0x00,
        ])
    }

    fn vp8_interframe() -> Bytes {
        Bytes::from_static(&[
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ])
    }

    fn sample(codec: CodecKind, timestamp: u32, dropped: u16, payload: Bytes) -> Sample {
        Sample {
            track_id: "t".to_string(),
            codec,
            timestamp,
            sequence_number: 0,
            prev_dropped_packets: dropped,
            payload,
        }
    }

    #[test]
    fn test_keyframe_initializes_four_track_container() {
        let saver = WebmSaver::new(WebmSaverConfig {
            id: "id".to_string(),
        });
        let sink = BufWriter::new();
        saver.attach(sink.clone()).unwrap();

        saver
            .write(&sample(CodecKind::Vp8, 90_000, 0, vp8_keyframe()))
            .unwrap();
        saver
            .write(&sample(CodecKind::Opus, 48_000, 0, Bytes::from_static(&[0x11, 0x22])))
            .unwrap();
        saver.close();

        let out = sink.contents();
        assert_eq!(&out[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert_eq!(count(&out, b"A_OPUS"), 1);
        assert_eq!(count(&out, b"V_VP8"), 1);
        assert_eq!(count(&out, b"D_WEBVTT/METADATA"), 2);
        // dimensions parsed from the keyframe: 640x480
        assert!(contains(
            &out,
            &[0xB0, 0x82, 0x02, 0x80, 0xBA, 0x82, 0x01, 0xE0]
        ));
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pre_buffer_cap_forces_default_dimensions() {
        let saver = WebmSaver::new(WebmSaverConfig {
            id: "id".to_string(),
        });
        let sink = BufWriter::new();
        saver.attach(sink.clone()).unwrap();

        for i in 0..(60 * 15) {
            saver
                .write(&sample(CodecKind::Vp8, i * 3_000, 0, vp8_interframe()))
                .unwrap();
        }

        // initialized without ever seeing a keyframe
        let out = sink.contents();
        assert!(!out.is_empty());
        assert!(contains(
            &out,
            &[0xB0, 0x82, 0x02, 0x80, 0xBA, 0x82, 0x01, 0xE0]
        ));

        saver.close();
    }

    #[test]
    fn test_dropped_packets_produce_metadata_record() {
        let saver = WebmSaver::new(WebmSaverConfig {
            id: "id".to_string(),
        });
        let sink = BufWriter::new();
        saver.attach(sink.clone()).unwrap();

        saver
            .write(&sample(CodecKind::Vp8, 0, 0, vp8_keyframe()))
            .unwrap();
        saver
            .write(&sample(CodecKind::Opus, 96_000, 3, Bytes::from_static(&[0x11])))
            .unwrap();
        saver.close();

        // SimpleBlock on the audio metadata track (1) at relative time 0
        // carrying the big-endian dropped count
        let out = sink.contents();
        assert!(contains(
            &out,
            &[0xA3, 0x86, 0x81, 0x00, 0x00, 0x80, 0x00, 0x03]
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let saver = WebmSaver::new(WebmSaverConfig {
            id: "id".to_string(),
        });
        let sink = BufWriter::new();
        saver.attach(sink.clone()).unwrap();

        saver.close();
        saver.close();

        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        // container was still finalized with defaults
        let out = sink.contents();
        assert_eq!(&out[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
    }

    #[test]
    fn test_writes_after_close_are_ignored() {
        let saver = WebmSaver::new(WebmSaverConfig {
            id: "id".to_string(),
        });
        let sink = BufWriter::new();
        saver.attach(sink.clone()).unwrap();

        saver.close();
        let len = sink.contents().len();

        saver
            .write(&sample(CodecKind::Opus, 0, 0, Bytes::from_static(&[0x01])))
            .unwrap();
        assert_eq!(sink.contents().len(), len);
    }
}
