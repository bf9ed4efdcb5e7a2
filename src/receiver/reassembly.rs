//! Fragment reassembly.
//!
//! Each fragmented frame is tracked as a pending record keyed by its
//! sequence number, so fragments of different frames may interleave on the
//! wire without corrupting each other. A record becomes complete once it
//! holds as many distinct chunks as the start datagram announced; bodies
//! arriving before their start are parked in an implicit record that stays
//! incomplete until the expected total is known.
//!
//! Records are discarded on timeout, and the map is additionally capped:
//! when a new record would exceed `max_pending`, the oldest pending record
//! is evicted so hostile or badly reordered input cannot grow memory.

use crate::wire::{FragmentBody, FragmentStart};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

struct PendingFrame {
    expected_total: Option<u32>,
    chunks: BTreeMap<u32, Vec<u8>>,
    started_at: Instant,
}

pub struct FrameReassembler {
    pending: HashMap<u32, PendingFrame>,
    max_pending: usize,
    frame_timeout: Duration,
}

impl FrameReassembler {
    pub fn new(max_pending: usize, frame_timeout: Duration) -> Self {
        Self { pending: HashMap::new(), max_pending: max_pending.max(1), frame_timeout }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Starts (or restarts) reassembly of a frame. Chunks already parked in
    /// an implicit record are adopted, so a start datagram reordered behind
    /// its bodies still completes the frame; a record whose total was
    /// already known is replaced outright, dropping its stale chunks.
    pub fn begin(&mut self, start: &FragmentStart, now: Instant, evicted: &mut Vec<u32>) -> Option<(u32, Vec<u8>)> {
        if let Some(record) = self.pending.get_mut(&start.seq) {
            if record.expected_total.is_none() {
                record.expected_total = Some(start.total_packets);
                if record.chunks.len() >= start.total_packets as usize {
                    return self.finish(start.seq);
                }
                return None;
            }
        } else {
            self.make_room(start.seq, evicted);
        }
        self.pending.insert(
            start.seq,
            PendingFrame { expected_total: Some(start.total_packets), chunks: BTreeMap::new(), started_at: now },
        );
        None
    }

    /// Stores one fragment body. Returns the reassembled JPEG once the
    /// record holding it is complete.
    pub fn ingest(&mut self, body: FragmentBody, now: Instant, evicted: &mut Vec<u32>) -> Option<(u32, Vec<u8>)> {
        if !self.pending.contains_key(&body.seq) {
            self.make_room(body.seq, evicted);
        }
        let record = self.pending.entry(body.seq).or_insert_with(|| PendingFrame {
            expected_total: None,
            chunks: BTreeMap::new(),
            started_at: now,
        });
        record.chunks.insert(body.packet_index, body.jpeg_chunk);

        let complete = matches!(record.expected_total, Some(total) if record.chunks.len() >= total as usize);
        if !complete {
            return None;
        }
        self.finish(body.seq)
    }

    fn finish(&mut self, seq: u32) -> Option<(u32, Vec<u8>)> {
        let record = self.pending.remove(&seq)?;
        let total_len = record.chunks.values().map(Vec::len).sum();
        let mut jpeg = Vec::with_capacity(total_len);
        for chunk in record.chunks.values() {
            jpeg.extend_from_slice(chunk);
        }
        Some((seq, jpeg))
    }

    /// Discards records older than the frame timeout, returning their
    /// sequence numbers.
    pub fn sweep(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, record)| now.duration_since(record.started_at) > self.frame_timeout)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in &expired {
            self.pending.remove(seq);
        }
        expired
    }

    fn make_room(&mut self, incoming: u32, evicted: &mut Vec<u32>) {
        while self.pending.len() >= self.max_pending && !self.pending.contains_key(&incoming) {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, record)| record.started_at)
                .map(|(&seq, _)| seq);
            match oldest {
                Some(seq) => {
                    self.pending.remove(&seq);
                    log::warn!("too many frames reassembling, evicting incomplete frame {seq}");
                    evicted.push(seq);
                }
                None => break,
            }
        }
    }
}
