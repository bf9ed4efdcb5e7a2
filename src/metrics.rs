//! Transport counters.
//!
//! Per-packet events are too frequent to log individually, so the hot paths
//! record into relaxed atomics and the interesting lines (drops, skips,
//! deliveries) are emitted at a sampled cadence by their owners.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a datagram or frame was discarded. Values feed structured log lines
/// and the per-reason drop counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Datagram decoded to none of the four wire shapes.
    Malformed,
    /// Payload claimed to be JPEG but would not decode.
    InvalidJpeg,
    /// Pending fragment set expired before completion.
    FragmentTimeout,
    /// Pending fragment set evicted to bound the reassembler.
    PendingOverflow,
    /// Sequence number already present in the reorder buffer.
    Duplicate,
    /// Delivery queue full, oldest frame shed.
    QueueFull,
    /// Reorder entry expired while waiting for its predecessors.
    StaleFrame,
}

impl DropReason {
    pub const ALL: [DropReason; 7] = [
        DropReason::Malformed,
        DropReason::InvalidJpeg,
        DropReason::FragmentTimeout,
        DropReason::PendingOverflow,
        DropReason::Duplicate,
        DropReason::QueueFull,
        DropReason::StaleFrame,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::InvalidJpeg => "invalid_jpeg",
            DropReason::FragmentTimeout => "fragment_timeout",
            DropReason::PendingOverflow => "pending_overflow",
            DropReason::Duplicate => "duplicate",
            DropReason::QueueFull => "queue_full",
            DropReason::StaleFrame => "stale_frame",
        }
    }

    pub fn index(self) -> usize {
        match self {
            DropReason::Malformed => 0,
            DropReason::InvalidJpeg => 1,
            DropReason::FragmentTimeout => 2,
            DropReason::PendingOverflow => 3,
            DropReason::Duplicate => 4,
            DropReason::QueueFull => 5,
            DropReason::StaleFrame => 6,
        }
    }
}

/// Receiver-side counters, shared between the ingress thread and the
/// consumer-facing handle.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    datagrams_total: AtomicU64,
    bytes_total: AtomicU64,
    syncs_total: AtomicU64,
    frames_delivered: AtomicU64,
    frames_skipped: AtomicU64,
    drops: [AtomicU64; DropReason::ALL.len()],
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_datagram(&self, bytes: usize) {
        self.datagrams_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sync(&self) {
        self.syncs_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records frames abandoned by a forced gap skip.
    pub fn record_skipped(&self, count: u32) {
        self.frames_skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_drop(&self, reason: DropReason) {
        self.drops[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut drops = Vec::with_capacity(DropReason::ALL.len());
        for reason in DropReason::ALL {
            drops.push((reason.as_str(), self.drops[reason.index()].load(Ordering::Relaxed)));
        }
        MetricsSnapshot {
            datagrams_total: self.datagrams_total.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            syncs_total: self.syncs_total.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            drops,
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub datagrams_total: u64,
    pub bytes_total: u64,
    pub syncs_total: u64,
    pub frames_delivered: u64,
    pub frames_skipped: u64,
    pub drops: Vec<(&'static str, u64)>,
}

impl MetricsSnapshot {
    pub fn drop_count(&self, reason: DropReason) -> u64 {
        self.drops
            .iter()
            .find(|(name, _)| *name == reason.as_str())
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reasons_round_trip_through_index() {
        for reason in DropReason::ALL {
            assert_eq!(DropReason::ALL[reason.index()], reason);
        }
    }

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = TransportMetrics::new();
        metrics.record_datagram(100);
        metrics.record_datagram(50);
        metrics.record_sync();
        metrics.record_delivered();
        metrics.record_skipped(3);
        metrics.record_drop(DropReason::Malformed);
        metrics.record_drop(DropReason::Malformed);
        metrics.record_drop(DropReason::QueueFull);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.datagrams_total, 2);
        assert_eq!(snapshot.bytes_total, 150);
        assert_eq!(snapshot.syncs_total, 1);
        assert_eq!(snapshot.frames_delivered, 1);
        assert_eq!(snapshot.frames_skipped, 3);
        assert_eq!(snapshot.drop_count(DropReason::Malformed), 2);
        assert_eq!(snapshot.drop_count(DropReason::QueueFull), 1);
        assert_eq!(snapshot.drop_count(DropReason::Duplicate), 0);
    }
}
