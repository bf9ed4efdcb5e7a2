//! Randomized drives of the reorder and reassembly state, checking the
//! transport's ordering and boundedness guarantees.

use drishti_stream::frame::FrameShape;
use drishti_stream::receiver::reassembly::FrameReassembler;
use drishti_stream::receiver::reorder::ReorderBuffer;
use drishti_stream::receiver::sync::SyncTracker;
use drishti_stream::wire::{FragmentStart, SyncMessage, FRAME_TIMEOUT, MAX_REORDER, MAX_SEQ, SYNC_TIMEOUT};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Instant;

fn blank() -> RgbImage {
    RgbImage::new(1, 1)
}

#[test]
fn any_lossless_permutation_delivers_every_frame_in_order() {
    let mut rng = StdRng::seed_from_u64(0xD415);
    for trial in 0..20 {
        let n: u32 = rng.gen_range(1..=MAX_REORDER as u32);
        let mut seqs: Vec<u32> = (0..n).collect();
        seqs.shuffle(&mut rng);

        let mut buffer = ReorderBuffer::new(MAX_REORDER, FRAME_TIMEOUT);
        let now = Instant::now();
        let mut delivered = Vec::new();
        for &seq in &seqs {
            let result = buffer.insert(seq, blank(), None, now, true);
            delivered.extend(result.delivered.iter().map(|frame| frame.seq));
            assert_eq!(result.skipped, 0, "trial {trial}: no frame was lost, nothing may be skipped");
        }
        let expected: Vec<u32> = (0..n).collect();
        assert_eq!(delivered, expected, "trial {trial} with arrival order {seqs:?}");
        assert!(buffer.is_empty());
    }
}

#[test]
fn lossy_shuffled_arrivals_stay_monotone_without_duplicates() {
    let mut rng = StdRng::seed_from_u64(0xBEEF);
    for trial in 0..10 {
        let mut seqs: Vec<u32> = (0..400).filter(|_| rng.gen_bool(0.9)).collect();
        seqs.shuffle(&mut rng);

        let mut buffer = ReorderBuffer::new(MAX_REORDER, FRAME_TIMEOUT);
        let now = Instant::now();
        let mut delivered = Vec::new();
        for &seq in &seqs {
            let result = buffer.insert(seq, blank(), None, now, true);
            delivered.extend(result.delivered.iter().map(|frame| frame.seq));
        }

        for window in delivered.windows(2) {
            assert!(
                window[0] < window[1],
                "trial {trial}: delivery order regressed ({} then {})",
                window[0],
                window[1]
            );
        }
    }
}

#[test]
fn reorder_buffer_stays_bounded_across_wrapping_lossy_run() {
    let mut rng = StdRng::seed_from_u64(0xCAFE);
    let mut buffer = ReorderBuffer::new(MAX_REORDER, FRAME_TIMEOUT);
    let now = Instant::now();

    let mut delivered: u64 = 0;
    for i in 0..200_000u64 {
        let seq = (i % MAX_SEQ as u64) as u32;
        if rng.gen_bool(0.05) {
            continue;
        }
        let result = buffer.insert(seq, blank(), None, now, true);
        delivered += result.delivered.len() as u64;
        if i % 1000 == 0 {
            assert!(buffer.len() <= MAX_REORDER, "buffer grew to {} at frame {i}", buffer.len());
        }
    }
    assert!(buffer.len() <= MAX_REORDER);
    assert!(delivered > 150_000, "only {delivered} frames delivered");
}

#[test]
fn wrapping_stream_delivers_per_segment_order() {
    // Boundary: frames 4998, 4999, a restart sync at 0, then 0, 1, 2.
    // Output order preserves each segment with the buffer cleared at the
    // restart.
    let sync = |current_seq: u32, is_new_stream: bool| SyncMessage {
        stream_id: 7,
        sync_seq: 0,
        current_seq,
        frame_count: 0,
        timestamp: 0.0,
        is_new_stream,
    };

    let mut tracker = SyncTracker::new(SYNC_TIMEOUT);
    let mut buffer = ReorderBuffer::new(MAX_REORDER, FRAME_TIMEOUT);
    let now = Instant::now();
    let mut delivered = Vec::new();

    tracker.observe(&sync(4998, true), &mut buffer, now);
    for seq in [4998u32, 4999] {
        let result = buffer.insert(seq, blank(), None, now, tracker.synced());
        delivered.extend(result.delivered.iter().map(|frame| frame.seq));
    }
    tracker.observe(&sync(0, true), &mut buffer, now);
    for seq in [0u32, 1, 2] {
        let result = buffer.insert(seq, blank(), None, now, tracker.synced());
        delivered.extend(result.delivered.iter().map(|frame| frame.seq));
    }

    assert_eq!(delivered, vec![4998, 4999, 0, 1, 2]);
}

#[test]
fn pending_fragment_map_stays_bounded() {
    let max_pending = 16;
    let mut reassembler = FrameReassembler::new(max_pending, FRAME_TIMEOUT);
    let mut evicted = Vec::new();
    let now = Instant::now();

    // Starts that never complete, cycling the whole sequence space.
    for i in 0..10_000u32 {
        let start = FragmentStart {
            total_packets: 4,
            seq: i % MAX_SEQ,
            frame_shape: FrameShape { height: 1, width: 1, channels: 3 },
            frame_count: 0,
            stream_id: 1,
        };
        let completed = reassembler.begin(&start, now, &mut evicted);
        assert!(completed.is_none());
        assert!(reassembler.pending_len() <= max_pending);
    }
    assert_eq!(evicted.len(), 10_000 - max_pending);
}
