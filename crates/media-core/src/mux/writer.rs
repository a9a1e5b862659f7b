//! Four-track WebM block writer with cross-track ordering
//!
//! Blocks arrive tagged with a track number and a millisecond timestamp
//! and may interleave out of order across tracks (audio and video come
//! from independent builders). A bounded-delay sorter holds blocks back
//! until every active track has progressed past them, or until they age
//! beyond the tolerated cross-stream delay, and then writes them to the
//! container in non-decreasing time order. Blocks that arrive behind the
//! already-written position are dropped rather than stalling the writer.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

use tracing::warn;

use super::ebml;

/// Matroska track type: video
pub const TRACK_TYPE_VIDEO: u8 = 1;

/// Matroska track type: audio
pub const TRACK_TYPE_AUDIO: u8 = 2;

/// Matroska track type used for the dropped-packet metadata tracks
pub const TRACK_TYPE_METADATA: u8 = 0x21;

/// Audio parameters for a track entry
#[derive(Debug, Clone, Copy)]
pub struct AudioSpec {
    pub sampling_frequency: f64,
    pub channels: u64,
}

/// Video parameters for a track entry
#[derive(Debug, Clone, Copy)]
pub struct VideoSpec {
    pub pixel_width: u64,
    pub pixel_height: u64,
}

/// One entry of the container track table
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub number: u64,
    pub uid: u64,
    pub name: String,
    pub codec_id: String,
    pub track_type: u8,
    pub default_duration_ns: Option<u64>,
    pub audio: Option<AudioSpec>,
    pub video: Option<VideoSpec>,
}

struct QueuedBlock {
    track: u64,
    keyframe: bool,
    timestamp_ms: i64,
    data: Vec<u8>,
}

/// Streaming WebM writer over any byte sink
pub struct BlockWriter<W: Write> {
    writer: W,
    video_track: Option<u64>,
    /// Tracks participating in the sorter's catch-up rule; metadata
    /// tracks write rarely and must not hold the media tracks back
    media_tracks: Vec<u64>,
    max_delay_ms: i64,
    // (timestamp, arrival counter) keeps equal-timestamp blocks stable
    queue: BTreeMap<(i64, u64), QueuedBlock>,
    queue_seq: u64,
    latest_by_track: HashMap<u64, i64>,
    last_emitted_ms: Option<i64>,
    dropped_blocks: u64,
    cluster_start: i64,
    cluster_open: bool,
}

impl<W: Write> BlockWriter<W> {
    /// Write the container header and track table, ready for blocks
    pub fn new(writer: W, tracks: &[TrackSpec], max_delay_ms: i64) -> io::Result<Self> {
        let video_track = tracks
            .iter()
            .find(|t| t.track_type == TRACK_TYPE_VIDEO)
            .map(|t| t.number);
        let media_tracks = tracks
            .iter()
            .filter(|t| t.track_type != TRACK_TYPE_METADATA)
            .map(|t| t.number)
            .collect();

        let mut w = Self {
            writer,
            video_track,
            media_tracks,
            max_delay_ms,
            queue: BTreeMap::new(),
            queue_seq: 0,
            latest_by_track: HashMap::new(),
            last_emitted_ms: None,
            dropped_blocks: 0,
            cluster_start: 0,
            cluster_open: false,
        };
        w.write_header(tracks)?;
        Ok(w)
    }

    /// Queue one block for writing
    pub fn write_block(
        &mut self,
        track: u64,
        keyframe: bool,
        timestamp_ms: i64,
        data: &[u8],
    ) -> io::Result<()> {
        if let Some(emitted) = self.last_emitted_ms {
            if timestamp_ms < emitted {
                // behind the already-written position: outdated
                self.dropped_blocks += 1;
                warn!(
                    "dropping outdated block on track {} at {}ms (written up to {}ms)",
                    track, timestamp_ms, emitted
                );
                return Ok(());
            }
        }

        if self.media_tracks.contains(&track) {
            let latest = self.latest_by_track.entry(track).or_insert(timestamp_ms);
            if timestamp_ms > *latest {
                *latest = timestamp_ms;
            }
        }

        self.queue.insert(
            (timestamp_ms, self.queue_seq),
            QueuedBlock {
                track,
                keyframe,
                timestamp_ms,
                data: data.to_vec(),
            },
        );
        self.queue_seq += 1;

        self.flush_ready()
    }

    /// Number of blocks currently held back by the sorter
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Timestamp of the last block written to the sink
    pub fn last_emitted_ms(&self) -> Option<i64> {
        self.last_emitted_ms
    }

    /// Blocks dropped for arriving behind the written position
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    /// Flush every queued block and the underlying sink
    pub fn finalize(&mut self) -> io::Result<()> {
        let remaining: Vec<_> = std::mem::take(&mut self.queue).into_values().collect();
        for block in remaining {
            self.emit(block)?;
        }
        if self.dropped_blocks > 0 {
            warn!("{} blocks dropped by the sync window", self.dropped_blocks);
        }
        self.writer.flush()
    }

    fn flush_ready(&mut self) -> io::Result<()> {
        loop {
            let Some((&(ts, _), _)) = self.queue.first_key_value() else {
                return Ok(());
            };

            // release once every active track has moved past this block,
            // or the block has aged out of the sync window
            let min_latest = self.latest_by_track.values().min().copied().unwrap_or(ts);
            let newest = self.latest_by_track.values().max().copied().unwrap_or(ts);
            let threshold = min_latest.max(newest - self.max_delay_ms);
            if ts > threshold {
                return Ok(());
            }

            let Some((_, block)) = self.queue.pop_first() else {
                return Ok(());
            };
            self.emit(block)?;
        }
    }

    fn emit(&mut self, block: QueuedBlock) -> io::Result<()> {
        let needs_cluster = !self.cluster_open
            || block.timestamp_ms - self.cluster_start > i16::MAX as i64
            || (block.keyframe
                && Some(block.track) == self.video_track
                && block.timestamp_ms > self.cluster_start);
        if needs_cluster {
            self.start_cluster(block.timestamp_ms)?;
        }

        let rel = (block.timestamp_ms - self.cluster_start) as i16;

        let mut payload = Vec::with_capacity(block.data.len() + 4);
        // track numbers are small enough for a one-byte vint
        payload.push(0x80 | (block.track as u8));
        payload.extend_from_slice(&rel.to_be_bytes());
        payload.push(if block.keyframe { 0x80 } else { 0x00 });
        payload.extend_from_slice(&block.data);

        self.writer
            .write_all(&ebml::encode_element(ebml::SIMPLE_BLOCK_ID, &payload))?;
        self.last_emitted_ms = Some(block.timestamp_ms);
        Ok(())
    }

    fn start_cluster(&mut self, timestamp_ms: i64) -> io::Result<()> {
        self.writer.write_all(&ebml::encode_id(ebml::CLUSTER_ID))?;
        self.writer.write_all(&ebml::UNKNOWN_SIZE)?;
        self.writer.write_all(&ebml::encode_element(
            ebml::CLUSTER_TIMESTAMP_ID,
            &ebml::encode_uint(timestamp_ms.max(0) as u64),
        ))?;
        self.cluster_start = timestamp_ms;
        self.cluster_open = true;
        Ok(())
    }

    fn write_header(&mut self, tracks: &[TrackSpec]) -> io::Result<()> {
        // EBML header
        let mut header = Vec::new();
        header.extend(ebml::encode_element(ebml::EBML_VERSION_ID, &[1]));
        header.extend(ebml::encode_element(ebml::EBML_READ_VERSION_ID, &[1]));
        header.extend(ebml::encode_element(ebml::EBML_MAX_ID_LENGTH_ID, &[4]));
        header.extend(ebml::encode_element(ebml::EBML_MAX_SIZE_LENGTH_ID, &[8]));
        header.extend(ebml::encode_element(ebml::DOC_TYPE_ID, b"webm"));
        header.extend(ebml::encode_element(ebml::DOC_TYPE_VERSION_ID, &[4]));
        header.extend(ebml::encode_element(ebml::DOC_TYPE_READ_VERSION_ID, &[2]));
        self.writer
            .write_all(&ebml::encode_element(ebml::EBML_HEADER_ID, &header))?;

        // Segment with unknown size for streaming
        self.writer.write_all(&ebml::encode_id(ebml::SEGMENT_ID))?;
        self.writer.write_all(&ebml::UNKNOWN_SIZE)?;

        // Segment info: millisecond timestamp scale
        let mut info = Vec::new();
        info.extend(ebml::encode_element(
            ebml::TIMESTAMP_SCALE_ID,
            &ebml::encode_uint(1_000_000),
        ));
        info.extend(ebml::encode_element(ebml::MUXING_APP_ID, b"avflow"));
        info.extend(ebml::encode_element(ebml::WRITING_APP_ID, b"avflow"));
        self.writer
            .write_all(&ebml::encode_element(ebml::SEGMENT_INFO_ID, &info))?;

        // Track table
        let mut entries = Vec::new();
        for track in tracks {
            entries.extend(ebml::encode_element(
                ebml::TRACK_ENTRY_ID,
                &Self::encode_track_entry(track),
            ));
        }
        self.writer
            .write_all(&ebml::encode_element(ebml::TRACKS_ID, &entries))?;

        Ok(())
    }

    fn encode_track_entry(track: &TrackSpec) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend(ebml::encode_element(
            ebml::TRACK_NUMBER_ID,
            &ebml::encode_uint(track.number),
        ));
        entry.extend(ebml::encode_element(
            ebml::TRACK_UID_ID,
            &ebml::encode_uint(track.uid),
        ));
        entry.extend(ebml::encode_element(
            ebml::TRACK_TYPE_ID,
            &[track.track_type],
        ));
        entry.extend(ebml::encode_element(
            ebml::TRACK_NAME_ID,
            track.name.as_bytes(),
        ));
        entry.extend(ebml::encode_element(
            ebml::CODEC_ID_ID,
            track.codec_id.as_bytes(),
        ));
        if let Some(duration) = track.default_duration_ns {
            entry.extend(ebml::encode_element(
                ebml::DEFAULT_DURATION_ID,
                &ebml::encode_uint(duration),
            ));
        }
        if let Some(audio) = &track.audio {
            let mut a = Vec::new();
            a.extend(ebml::encode_element(
                ebml::SAMPLING_FREQUENCY_ID,
                &ebml::encode_float(audio.sampling_frequency),
            ));
            a.extend(ebml::encode_element(
                ebml::CHANNELS_ID,
                &ebml::encode_uint(audio.channels),
            ));
            entry.extend(ebml::encode_element(ebml::AUDIO_ID, &a));
        }
        if let Some(video) = &track.video {
            let mut v = Vec::new();
            v.extend(ebml::encode_element(
                ebml::PIXEL_WIDTH_ID,
                &ebml::encode_uint(video.pixel_width),
            ));
            v.extend(ebml::encode_element(
                ebml::PIXEL_HEIGHT_ID,
                &ebml::encode_uint(video.pixel_height),
            ));
            entry.extend(ebml::encode_element(ebml::VIDEO_ID, &v));
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<TrackSpec> {
        vec![
            TrackSpec {
                number: 1,
                uid: 11,
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
                number: 2,
                uid: 22,
                name: "Video".to_string(),
                codec_id: "V_VP8".to_string(),
                track_type: TRACK_TYPE_VIDEO,
                default_duration_ns: Some(20_000_000),
                audio: None,
                video: Some(VideoSpec {
                    pixel_width: 640,
                    pixel_height: 480,
                }),
            },
        ]
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_header_carries_track_table() {
        let mut out = Vec::new();
        {
            let mut writer = BlockWriter::new(&mut out, &specs(), 1000).unwrap();
            writer.finalize().unwrap();
        }
        assert_eq!(&out[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert!(contains(&out, b"webm"));
        assert!(contains(&out, b"A_OPUS"));
        assert!(contains(&out, b"V_VP8"));
    }

    #[test]
    fn test_sorter_orders_across_tracks() {
        let mut out = Vec::new();
        let mut writer = BlockWriter::new(&mut out, &specs(), 100).unwrap();

        // single active track flushes immediately
        writer.write_block(2, true, 50, &[1]).unwrap();
        assert_eq!(writer.last_emitted_ms(), Some(50));

        // behind the written position: dropped, not written
        writer.write_block(1, true, 30, &[2]).unwrap();
        assert_eq!(writer.dropped_blocks(), 1);

        // held until the other track catches up
        writer.write_block(1, true, 60, &[3]).unwrap();
        assert_eq!(writer.pending(), 1);
        writer.write_block(2, true, 70, &[4]).unwrap();
        assert_eq!(writer.last_emitted_ms(), Some(60));
        assert_eq!(writer.pending(), 1);

        // aging past the window releases blocks without the slow track
        writer.write_block(1, true, 200, &[5]).unwrap();
        assert_eq!(writer.last_emitted_ms(), Some(70));

        writer.finalize().unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.last_emitted_ms(), Some(200));
    }

    #[test]
    fn test_cluster_rollover_on_large_timecode() {
        let mut out = Vec::new();
        let mut writer = BlockWriter::new(&mut out, &specs(), 100).unwrap();
        writer.write_block(1, true, 0, &[1]).unwrap();
        writer.write_block(1, true, 40_000, &[2]).unwrap();
        writer.finalize().unwrap();

        // two cluster headers in the stream
        let cluster_id = ebml::encode_id(ebml::CLUSTER_ID);
        let count = out
            .windows(cluster_id.len())
            .filter(|w| *w == cluster_id.as_slice())
            .count();
        assert_eq!(count, 2);
    }
}
