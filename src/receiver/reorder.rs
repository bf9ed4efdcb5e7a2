//! Reorder buffer: holds decoded frames until their predecessors arrive.
//!
//! The buffer is an ordered map from sequence number to entry, bounded at
//! `capacity`. Insertion applies four rules in order:
//!
//! 1. **Wrap detection.** A sequence far below `next_expected` (further
//!    than `MAX_SEQ - RESET_THRESHOLD`) means the sender wrapped and the
//!    restart sync was lost; resynchronize to the incoming number. The
//!    check is the literal distance formula, not modular arithmetic.
//! 2. **Cold start.** Before any sync has been observed, an empty buffer
//!    expecting 0 that sees a sequence above `COLD_START_JUMP` jumps
//!    forward instead of waiting out thousands of frames that will never
//!    come.
//! 3. **Insert.**
//! 4. **Forced progress.** While the buffer sits at capacity after in-order
//!    frames have drained, the gap at `next_expected` is declared lost:
//!    jump to the lowest buffered sequence so it and its successors flow
//!    out, or when the stuck entries sit below the expectation, evict the
//!    lowest (advancing past it when it was the expected one). Blocking
//!    forever on a lost frame is the one failure mode this buffer must
//!    never have.
//!
//! Every consecutive frame starting at `next_expected` is handed back for
//! delivery, then entries older than the frame timeout are dropped without
//! advancing expectations; advancement past losses is rule 4's job.

use crate::wire::{COLD_START_JUMP, MAX_SEQ, RESET_THRESHOLD};
use image::RgbImage;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Increments a sequence number with wraparound.
pub fn next_seq(seq: u32) -> u32 {
    (seq + 1) % MAX_SEQ
}

struct ReorderEntry {
    image: RgbImage,
    source: Option<SocketAddr>,
    arrived_at: Instant,
}

/// A frame released in order, ready for the delivery queue.
pub struct DeliveredFrame {
    pub seq: u32,
    pub image: RgbImage,
    pub source: Option<SocketAddr>,
}

/// Outcome of one insertion.
#[derive(Default)]
pub struct InsertResult {
    /// Frames now deliverable, in sequence order.
    pub delivered: Vec<DeliveredFrame>,
    /// Frames declared lost by a forced gap skip.
    pub skipped: u32,
    /// Entries expired by the frame timeout during this insertion.
    pub expired: Vec<u32>,
}

pub struct ReorderBuffer {
    entries: BTreeMap<u32, ReorderEntry>,
    next_expected: u32,
    capacity: usize,
    frame_timeout: Duration,
}

impl ReorderBuffer {
    pub fn new(capacity: usize, frame_timeout: Duration) -> Self {
        Self { entries: BTreeMap::new(), next_expected: 0, capacity, frame_timeout }
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stream boundary: adopt a new expectation and discard everything
    /// buffered under the old one.
    pub fn resync(&mut self, seq: u32) {
        self.next_expected = seq;
        self.entries.clear();
    }

    /// Drift correction: move the expectation without touching buffered
    /// entries, which the timeout sweep will reap if they are stale.
    pub fn set_next_expected(&mut self, seq: u32) {
        self.next_expected = seq;
    }

    pub fn insert(
        &mut self,
        seq: u32,
        image: RgbImage,
        source: Option<SocketAddr>,
        now: Instant,
        sync_seen: bool,
    ) -> InsertResult {
        let mut result = InsertResult::default();

        if seq < self.next_expected && self.next_expected - seq > MAX_SEQ - RESET_THRESHOLD {
            log::info!(
                "frame {seq}: sequence reset detected (expected {}), resynchronizing",
                self.next_expected
            );
            self.resync(seq);
        }

        if !sync_seen && self.next_expected == 0 && seq > COLD_START_JUMP && self.entries.is_empty() {
            log::info!("no sync observed yet, jumping to sequence {seq}");
            self.next_expected = seq;
        }

        self.entries.insert(seq, ReorderEntry { image, source, arrived_at: now });

        loop {
            while let Some(entry) = self.entries.remove(&self.next_expected) {
                result.delivered.push(DeliveredFrame {
                    seq: self.next_expected,
                    image: entry.image,
                    source: entry.source,
                });
                self.next_expected = next_seq(self.next_expected);
            }

            if self.entries.len() < self.capacity {
                break;
            }
            let Some(&lowest) = self.entries.keys().next() else {
                break;
            };
            if self.next_expected < lowest {
                // The expected frame is gone for good; the next drain pass
                // releases everything from the skip target onward.
                let lost = lowest - self.next_expected;
                log::warn!(
                    "reorder buffer full, skipping {lost} lost frames ({} -> {lowest})",
                    self.next_expected
                );
                self.next_expected = lowest;
                result.skipped += lost;
            } else {
                self.entries.remove(&lowest);
                log::debug!("reorder buffer full, evicting frame {lowest}");
                if lowest == self.next_expected {
                    self.next_expected = next_seq(self.next_expected);
                }
            }
        }

        result.expired = self.expire(now);
        result
    }

    /// Drops entries that have waited longer than the frame timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.arrived_at) > self.frame_timeout)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in &expired {
            self.entries.remove(seq);
        }
        expired
    }
}
