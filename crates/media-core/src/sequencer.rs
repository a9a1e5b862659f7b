//! Sample sequencing: reassembling ordered frames from a reordered
//! packet stream
//!
//! Packets are keyed by an extended (wrap-corrected) sequence number in a
//! sorted map. A frame is the maximal run of consecutive packets sharing
//! one RTP timestamp; it is released once the packet after the run has a
//! newer timestamp, which proves the run is complete. The buffer tolerates
//! out-of-order arrival up to `max_late` packets; anything older is
//! dropped and surfaces as the `prev_dropped_packets` delta on the next
//! released frame.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use avflow_rtp_core::{RtpPacket, RtpSequenceNumber, RtpTimestamp};

use crate::payload::Depacketizer;

const SEQUENCE_CYCLE: u64 = 1 << 16;

/// One reconstructed frame popped from the sequencer
#[derive(Debug, Clone)]
pub struct Frame {
    /// Depacketized frame payload
    pub data: Bytes,

    /// RTP timestamp of the frame
    pub timestamp: RtpTimestamp,

    /// Packets dropped by the window since the previous frame
    pub prev_dropped_packets: u16,
}

/// Jitter reassembly buffer for one track
pub struct SampleSequencer {
    depacketizer: Box<dyn Depacketizer>,
    max_late: usize,
    buffer: BTreeMap<u64, RtpPacket>,
    /// Highest extended sequence number observed, for wrap correction
    last_extended: Option<u64>,
    /// Extended sequence number the next consumed packet must carry;
    /// `None` until the first frame is consumed or after a resync
    next_consume: Option<u64>,
    /// Whether a partition head has been seen yet
    started: bool,
    /// Dropped packets accumulated since the last released frame
    dropped: u16,
}

impl SampleSequencer {
    /// Create a sequencer with the given out-of-order tolerance window
    pub fn new(depacketizer: Box<dyn Depacketizer>, max_late: usize) -> Self {
        Self {
            depacketizer,
            max_late: max_late.max(1),
            buffer: BTreeMap::new(),
            last_extended: None,
            next_consume: None,
            started: false,
            dropped: 0,
        }
    }

    /// Number of packets currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Add one packet to the buffer
    pub fn push(&mut self, packet: RtpPacket) {
        let ext = self.extend(packet.header.sequence_number);

        if let Some(next) = self.next_consume {
            if ext < next {
                // arrived after its frame was already passed over
                trace!("late packet at sequence {}", packet.header.sequence_number);
                self.dropped = self.dropped.saturating_add(1);
                return;
            }
        }

        if self.buffer.insert(ext, packet).is_some() {
            trace!("duplicate packet at extended sequence {ext}");
        }

        self.enforce_window();
    }

    /// Pop the next in-order complete frame, if any
    pub fn pop(&mut self) -> Option<Frame> {
        loop {
            let (start, end, timestamp) = self.next_complete_run()?;

            if !self.started {
                let head = match self.buffer.get(&start) {
                    Some(pkt) => self.depacketizer.is_partition_head(&pkt.payload),
                    None => false,
                };
                if !head {
                    // cannot decode from here; discard up to the next frame
                    for k in start..=end {
                        self.buffer.remove(&k);
                    }
                    self.dropped = self.dropped.saturating_add((end - start + 1) as u16);
                    self.next_consume = Some(end + 1);
                    continue;
                }
                self.started = true;
            }

            let mut data = BytesMut::new();
            let mut failed = false;
            for k in start..=end {
                let Some(pkt) = self.buffer.remove(&k) else {
                    continue;
                };
                match self.depacketizer.depacketize(&pkt.payload) {
                    Ok(chunk) => data.put_slice(&chunk),
                    Err(e) => {
                        debug!("depacketize error: {}", e);
                        failed = true;
                    }
                }
            }
            self.next_consume = Some(end + 1);

            if failed || data.is_empty() {
                self.dropped = self.dropped.saturating_add((end - start + 1) as u16);
                continue;
            }

            let prev_dropped_packets = std::mem::take(&mut self.dropped);
            return Some(Frame {
                data: data.freeze(),
                timestamp,
                prev_dropped_packets,
            });
        }
    }

    /// Locate the next consumable frame: a contiguous run at the head of
    /// the buffer terminated by a packet with a newer timestamp.
    fn next_complete_run(&self) -> Option<(u64, u64, RtpTimestamp)> {
        let (&start, start_pkt) = self.buffer.first_key_value()?;
        if let Some(next) = self.next_consume {
            if start != next {
                // still waiting on the next in-order packet
                return None;
            }
        }

        let timestamp = start_pkt.header.timestamp;
        let mut end = start;
        for (&k, pkt) in self.buffer.range(start + 1..) {
            if k != end + 1 {
                // gap inside the frame: not complete yet
                return None;
            }
            if pkt.header.timestamp != timestamp {
                return Some((start, end, timestamp));
            }
            end = k;
        }
        None
    }

    /// Map a wrapping 16-bit sequence number onto the extended sequence
    /// space, tracking the highest value seen.
    fn extend(&mut self, seq: RtpSequenceNumber) -> u64 {
        let ext = match self.last_extended {
            // start one cycle in so a slightly older packet stays positive
            None => SEQUENCE_CYCLE + seq as u64,
            Some(last) => {
                let base = last & !(SEQUENCE_CYCLE - 1);
                let mut ext = base | seq as u64;
                if ext > last + SEQUENCE_CYCLE / 2 {
                    ext -= SEQUENCE_CYCLE;
                } else if ext + SEQUENCE_CYCLE / 2 < last {
                    ext += SEQUENCE_CYCLE;
                }
                ext
            }
        };
        if self.last_extended.map_or(true, |last| ext > last) {
            self.last_extended = Some(ext);
        }
        ext
    }

    /// Drop packets that fell out of the tolerance window
    fn enforce_window(&mut self) {
        loop {
            let Some((&first, _)) = self.buffer.first_key_value() else {
                return;
            };
            let last = *self
                .buffer
                .last_key_value()
                .map(|(k, _)| k)
                .unwrap_or(&first);
            let wait_start = self.next_consume.unwrap_or(first);
            let span = last.saturating_sub(wait_start) + 1;
            if span as usize <= self.max_late {
                return;
            }

            if wait_start < first {
                // the packets we were waiting for never arrived
                self.dropped = self
                    .dropped
                    .saturating_add((first - wait_start) as u16);
                self.next_consume = None;
                self.started = false;
            } else {
                // head is stuck on an incomplete frame wider than the window
                self.buffer.pop_first();
                self.dropped = self.dropped.saturating_add(1);
                self.next_consume = None;
                self.started = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{OpusDepacketizer, Vp8Depacketizer};
    use avflow_rtp_core::RtpHeader;

    fn packet(seq: u16, ts: u32, payload: &[u8]) -> RtpPacket {
        RtpPacket::new(
            RtpHeader::new(96, seq, ts, 0xABCD),
            Bytes::copy_from_slice(payload),
        )
    }

    fn sequencer(max_late: usize) -> SampleSequencer {
        SampleSequencer::new(Box::new(OpusDepacketizer::new()), max_late)
    }

    #[test]
    fn test_in_order_frames() {
        let mut s = sequencer(50);
        for seq in 0u16..5 {
            s.push(packet(seq, seq as u32 * 960, &[seq as u8 + 1]));
        }
        // the final frame stays buffered until a newer timestamp arrives
        let mut frames = Vec::new();
        while let Some(f) = s.pop() {
            frames.push(f);
        }
        assert_eq!(frames.len(), 4);
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.timestamp, i as u32 * 960);
            assert_eq!(f.data.as_ref(), &[i as u8 + 1]);
            assert_eq!(f.prev_dropped_packets, 0);
        }
    }

    #[test]
    fn test_reordered_within_window() {
        let mut s = sequencer(50);
        let order = [1u16, 0, 3, 2, 5, 4, 6];
        let mut timestamps = Vec::new();
        for &seq in &order {
            s.push(packet(seq, seq as u32 * 960, &[seq as u8]));
            while let Some(f) = s.pop() {
                timestamps.push(f.timestamp);
            }
        }
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted);
        assert!(!timestamps.is_empty());
    }

    #[test]
    fn test_multi_packet_frame_concatenated() {
        let mut s = sequencer(50);
        s.push(packet(10, 1000, &[0xAA]));
        s.push(packet(11, 1000, &[0xBB]));
        assert!(s.pop().is_none());
        s.push(packet(12, 2000, &[0xCC]));
        let frame = s.pop().expect("frame should complete");
        assert_eq!(frame.timestamp, 1000);
        assert_eq!(frame.data.as_ref(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_sequence_wraparound() {
        let mut s = sequencer(50);
        s.push(packet(65534, 100, &[1]));
        s.push(packet(65535, 200, &[2]));
        s.push(packet(0, 300, &[3]));
        s.push(packet(1, 400, &[4]));
        let mut timestamps = Vec::new();
        while let Some(f) = s.pop() {
            timestamps.push(f.timestamp);
        }
        assert_eq!(timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn test_partition_head_gating() {
        let mut s = SampleSequencer::new(Box::new(Vp8Depacketizer::new()), 50);
        // first frame is not a partition head (S bit clear): dropped
        s.push(packet(0, 1000, &[0x00, 0x01]));
        // second frame is a valid head
        s.push(packet(1, 2000, &[0x10, 0x02]));
        s.push(packet(2, 3000, &[0x10, 0x03]));
        let frame = s.pop().expect("head frame");
        assert_eq!(frame.timestamp, 2000);
        assert_eq!(frame.prev_dropped_packets, 1);
    }

    #[test]
    fn test_late_packet_counts_as_dropped() {
        let mut s = sequencer(50);
        s.push(packet(2, 200, &[2]));
        s.push(packet(3, 300, &[3]));
        let first = s.pop().expect("frame 2 released");
        assert_eq!(first.timestamp, 200);
        // seq 1 shows up after its slot was passed over
        s.push(packet(1, 100, &[1]));
        s.push(packet(4, 400, &[4]));
        let next = s.pop().expect("frame 3 released");
        assert_eq!(next.timestamp, 300);
        assert_eq!(next.prev_dropped_packets, 1);
    }

    #[test]
    fn test_window_overflow_drops_and_accounts() {
        let mut s = sequencer(10);
        s.push(packet(0, 0, &[0]));
        assert!(s.pop().is_none());
        // leave a gap at seq 1 and overflow the window
        for seq in 2u16..14 {
            s.push(packet(seq, seq as u32 * 100, &[seq as u8]));
        }
        let frame = s.pop().expect("resynced frame");
        assert!(frame.prev_dropped_packets > 0);
        // output continues in order after the resync
        let mut last_ts = frame.timestamp;
        while let Some(f) = s.pop() {
            assert!(f.timestamp > last_ts);
            last_ts = f.timestamp;
        }
    }
}
