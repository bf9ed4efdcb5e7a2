//! Stream tracking driven by sync datagrams.
//!
//! The tracker owns the receiver's notion of which stream it is following
//! and how healthy that stream looks. Health is purely diagnostic; frames
//! are delivered in every state.

use crate::receiver::reorder::ReorderBuffer;
use crate::wire::{SyncMessage, DRIFT_THRESHOLD};
use std::time::{Duration, Instant};

/// Diagnostic stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    /// No sync observed yet.
    Cold,
    /// Syncs arriving on schedule.
    Synced,
    /// Syncs stopped arriving; delivery continues regardless.
    Unstable,
}

impl StreamHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamHealth::Cold => "cold",
            StreamHealth::Synced => "synced",
            StreamHealth::Unstable => "unstable",
        }
    }
}

/// What a sync datagram meant for the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// First sync ever; the advertised stream was adopted.
    Adopted,
    /// A different sender appeared; buffered frames were abandoned.
    StreamChanged { previous: u32 },
    /// Same stream restarted its sequence space.
    Restarted,
    /// Periodic sync disagreed with expectations beyond the threshold.
    Drifted { drift: i64 },
    /// Periodic sync, nothing to correct.
    Steady,
}

pub struct SyncTracker {
    stream_id: Option<u32>,
    last_sync_at: Option<Instant>,
    health: StreamHealth,
    sync_timeout: Duration,
}

impl SyncTracker {
    pub fn new(sync_timeout: Duration) -> Self {
        Self { stream_id: None, last_sync_at: None, health: StreamHealth::Cold, sync_timeout }
    }

    pub fn stream_id(&self) -> Option<u32> {
        self.stream_id
    }

    /// Whether any sync has ever been observed. Gates the reorder buffer's
    /// cold-start jump; a later UNSTABLE lapse does not reset this.
    pub fn synced(&self) -> bool {
        self.stream_id.is_some()
    }

    pub fn health(&self) -> StreamHealth {
        self.health
    }

    /// Applies one sync datagram to the stream state and the reorder
    /// buffer.
    pub fn observe(&mut self, sync: &SyncMessage, reorder: &mut ReorderBuffer, now: Instant) -> SyncOutcome {
        let outcome = match self.stream_id {
            None => {
                self.stream_id = Some(sync.stream_id);
                reorder.resync(sync.current_seq);
                SyncOutcome::Adopted
            }
            Some(current) if current != sync.stream_id => {
                self.stream_id = Some(sync.stream_id);
                reorder.resync(sync.current_seq);
                SyncOutcome::StreamChanged { previous: current }
            }
            Some(_) if sync.is_new_stream => {
                reorder.resync(sync.current_seq);
                SyncOutcome::Restarted
            }
            Some(_) => {
                let drift = sync.current_seq as i64 - reorder.next_expected() as i64;
                if drift.abs() > DRIFT_THRESHOLD {
                    reorder.set_next_expected(sync.current_seq);
                    SyncOutcome::Drifted { drift }
                } else {
                    SyncOutcome::Steady
                }
            }
        };
        self.last_sync_at = Some(now);
        self.health = StreamHealth::Synced;
        outcome
    }

    /// Checks the liveness clock. Returns `true` exactly when the stream
    /// transitions to unstable.
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        if self.health != StreamHealth::Synced {
            return false;
        }
        match self.last_sync_at {
            Some(last) if now.duration_since(last) > self.sync_timeout => {
                self.health = StreamHealth::Unstable;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{FRAME_TIMEOUT, MAX_REORDER, SYNC_TIMEOUT};
    use image::RgbImage;

    fn sync(stream_id: u32, current_seq: u32, is_new_stream: bool) -> SyncMessage {
        SyncMessage { stream_id, sync_seq: 0, current_seq, frame_count: 0, timestamp: 0.0, is_new_stream }
    }

    fn reorder() -> ReorderBuffer {
        ReorderBuffer::new(MAX_REORDER, FRAME_TIMEOUT)
    }

    #[test]
    fn first_sync_adopts_the_stream() {
        let mut tracker = SyncTracker::new(SYNC_TIMEOUT);
        let mut buffer = reorder();
        assert_eq!(tracker.health(), StreamHealth::Cold);
        let outcome = tracker.observe(&sync(11, 40, true), &mut buffer, Instant::now());
        assert_eq!(outcome, SyncOutcome::Adopted);
        assert_eq!(tracker.stream_id(), Some(11));
        assert_eq!(buffer.next_expected(), 40);
        assert_eq!(tracker.health(), StreamHealth::Synced);
    }

    #[test]
    fn stream_change_abandons_buffered_frames() {
        // Boundary: delivering stream S1 at next_expected = 120 when a sync
        // for S2 at sequence 500 arrives.
        let mut tracker = SyncTracker::new(SYNC_TIMEOUT);
        let mut buffer = reorder();
        let now = Instant::now();
        tracker.observe(&sync(1, 120, true), &mut buffer, now);
        buffer.insert(125, RgbImage::new(1, 1), None, now, true);
        assert_eq!(buffer.len(), 1);

        let outcome = tracker.observe(&sync(2, 500, false), &mut buffer, now);
        assert_eq!(outcome, SyncOutcome::StreamChanged { previous: 1 });
        assert_eq!(tracker.stream_id(), Some(2));
        assert_eq!(buffer.next_expected(), 500);
        assert!(buffer.is_empty());
    }

    #[test]
    fn restart_of_same_stream_clears_the_buffer() {
        let mut tracker = SyncTracker::new(SYNC_TIMEOUT);
        let mut buffer = reorder();
        let now = Instant::now();
        tracker.observe(&sync(5, 4998, true), &mut buffer, now);
        buffer.insert(4999, RgbImage::new(1, 1), None, now, true);
        let outcome = tracker.observe(&sync(5, 0, true), &mut buffer, now);
        assert_eq!(outcome, SyncOutcome::Restarted);
        assert_eq!(buffer.next_expected(), 0);
    }

    #[test]
    fn large_drift_resynchronizes_without_clearing() {
        // Boundary: periodic sync says current_seq = next_expected + 150.
        let mut tracker = SyncTracker::new(SYNC_TIMEOUT);
        let mut buffer = reorder();
        let now = Instant::now();
        tracker.observe(&sync(3, 100, true), &mut buffer, now);
        buffer.insert(103, RgbImage::new(1, 1), None, now, true);

        let outcome = tracker.observe(&sync(3, 250, false), &mut buffer, now);
        assert_eq!(outcome, SyncOutcome::Drifted { drift: 150 });
        assert_eq!(buffer.next_expected(), 250);
        assert_eq!(buffer.len(), 1, "drift correction must not clear the buffer");
    }

    #[test]
    fn small_drift_is_steady() {
        let mut tracker = SyncTracker::new(SYNC_TIMEOUT);
        let mut buffer = reorder();
        let now = Instant::now();
        tracker.observe(&sync(3, 100, true), &mut buffer, now);
        let outcome = tracker.observe(&sync(3, 150, false), &mut buffer, now);
        assert_eq!(outcome, SyncOutcome::Steady);
        assert_eq!(buffer.next_expected(), 100);
    }

    #[test]
    fn liveness_lapses_and_recovers() {
        let mut tracker = SyncTracker::new(Duration::from_millis(100));
        let mut buffer = reorder();
        let start = Instant::now();
        tracker.observe(&sync(9, 0, true), &mut buffer, start);

        assert!(!tracker.check_liveness(start + Duration::from_millis(50)));
        assert!(tracker.check_liveness(start + Duration::from_millis(200)));
        assert_eq!(tracker.health(), StreamHealth::Unstable);
        // Reported once per lapse, not on every sweep.
        assert!(!tracker.check_liveness(start + Duration::from_millis(300)));
        assert!(tracker.synced(), "cold-start jump must stay disarmed");

        tracker.observe(&sync(9, 10, false), &mut buffer, start + Duration::from_millis(400));
        assert_eq!(tracker.health(), StreamHealth::Synced);
    }

    #[test]
    fn cold_tracker_never_goes_unstable() {
        let mut tracker = SyncTracker::new(Duration::from_millis(10));
        assert!(!tracker.check_liveness(Instant::now() + Duration::from_secs(60)));
        assert_eq!(tracker.health(), StreamHealth::Cold);
    }
}
