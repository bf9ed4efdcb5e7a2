//! Receiver ingress thread.
//!
//! One thread owns the socket and all per-stream state; the delivery queue
//! is the only thing it shares with the consumer. Each loop pass receives
//! at most one datagram (bounded by the socket read timeout), dispatches
//! it by shape, then runs the sweeps: expired fragment sets, stale reorder
//! entries, and the sync liveness clock.

use crate::frame;
use crate::metrics::{DropReason, TransportMetrics};
use crate::receiver::queue::QueueProducer;
use crate::receiver::reassembly::FrameReassembler;
use crate::receiver::reorder::ReorderBuffer;
use crate::receiver::sync::{SyncOutcome, SyncTracker};
use crate::wire::{self, Datagram, SyncMessage, WholeFrame};
use image::RgbImage;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Largest datagram a single read can return.
const MAX_DATAGRAM_BYTES: usize = 65_536;

pub(crate) struct Ingress {
    socket: UdpSocket,
    stop: Arc<AtomicBool>,
    queue: QueueProducer<RgbImage>,
    reorder: ReorderBuffer,
    reassembler: FrameReassembler,
    sync: SyncTracker,
    stream_id: Arc<Mutex<Option<u32>>>,
    metrics: Arc<TransportMetrics>,
    log_frequency: u64,
    delivered_total: u64,
}

impl Ingress {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: UdpSocket,
        stop: Arc<AtomicBool>,
        queue: QueueProducer<RgbImage>,
        reorder: ReorderBuffer,
        reassembler: FrameReassembler,
        sync: SyncTracker,
        stream_id: Arc<Mutex<Option<u32>>>,
        metrics: Arc<TransportMetrics>,
        log_frequency: u64,
    ) -> Self {
        Self {
            socket,
            stop,
            queue,
            reorder,
            reassembler,
            sync,
            stream_id,
            metrics,
            log_frequency,
            delivered_total: 0,
        }
    }

    pub fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        while !self.stop.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                // Zero-length datagrams carry nothing; release() also uses
                // one to wake this read.
                Ok((0, _)) => {}
                Ok((len, src)) => {
                    self.metrics.record_datagram(len);
                    match wire::decode_datagram(&buf[..len]) {
                        Ok(datagram) => self.dispatch(datagram, src),
                        Err(err) => {
                            self.metrics.record_drop(DropReason::Malformed);
                            log::warn!("dropping datagram from {src}: {err}");
                        }
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {}
                Err(err) => {
                    if !self.stop.load(Ordering::Relaxed) {
                        log::error!("UDP recv error: {err}");
                    }
                }
            }
            self.sweep(Instant::now());
        }
        log::info!("UDP receiver stopped");
    }

    fn dispatch(&mut self, datagram: Datagram, src: SocketAddr) {
        let now = Instant::now();
        match datagram {
            Datagram::Sync(sync) => self.on_sync(sync, now),
            Datagram::FragmentStart(start) => {
                log::trace!("frame {} fragmenting into {} packets", start.seq, start.total_packets);
                let mut evicted = Vec::new();
                let completed = self.reassembler.begin(&start, now, &mut evicted);
                self.note_evicted(&evicted);
                if let Some((seq, jpeg)) = completed {
                    self.complete_frame(seq, &jpeg, None, now);
                }
            }
            Datagram::FragmentBody(body) => {
                log::trace!("fragment {} of frame {} received", body.packet_index, body.seq);
                let mut evicted = Vec::new();
                let completed = self.reassembler.ingest(body, now, &mut evicted);
                self.note_evicted(&evicted);
                if let Some((seq, jpeg)) = completed {
                    self.complete_frame(seq, &jpeg, None, now);
                }
            }
            Datagram::WholeFrame(frame) => self.on_whole_frame(frame, src, now),
        }
    }

    fn on_sync(&mut self, sync: SyncMessage, now: Instant) {
        self.metrics.record_sync();
        match self.sync.observe(&sync, &mut self.reorder, now) {
            SyncOutcome::Adopted => {
                log::info!(
                    "sync {}: adopted stream {} at sequence {}",
                    sync.sync_seq,
                    sync.stream_id,
                    sync.current_seq
                );
            }
            SyncOutcome::StreamChanged { previous } => {
                log::info!(
                    "sync {}: new stream detected ({previous} -> {}), resuming at sequence {}",
                    sync.sync_seq,
                    sync.stream_id,
                    sync.current_seq
                );
            }
            SyncOutcome::Restarted => {
                log::info!("sync {}: stream {} restarted at sequence {}", sync.sync_seq, sync.stream_id, sync.current_seq);
            }
            SyncOutcome::Drifted { drift } => {
                log::info!("sync {}: correcting drift of {drift} frames", sync.sync_seq);
            }
            SyncOutcome::Steady => {
                log::debug!("sync {}: stream {} at sequence {}", sync.sync_seq, sync.stream_id, sync.current_seq);
            }
        }
        *self.stream_id.lock() = self.sync.stream_id();
    }

    fn on_whole_frame(&mut self, whole: WholeFrame, src: SocketAddr, now: Instant) {
        self.complete_frame(whole.seq, &whole.jpeg_data, Some(src), now);
    }

    /// Common tail for whole and reassembled frames: duplicate check,
    /// marker diagnostics, decode, reorder insert.
    fn complete_frame(&mut self, seq: u32, jpeg: &[u8], source: Option<SocketAddr>, now: Instant) {
        if self.reorder.contains(seq) {
            self.metrics.record_drop(DropReason::Duplicate);
            log::debug!("frame {seq}: duplicate, ignoring");
            return;
        }
        let header = frame::has_jpeg_header(jpeg);
        let footer = frame::has_jpeg_footer(jpeg);
        if !header || !footer {
            // Decode anyway; partial encoder output is often still usable.
            log::warn!("frame {seq}: suspicious JPEG markers (header: {header}, footer: {footer})");
        }
        match frame::decode_jpeg(jpeg) {
            Some(image) => self.insert_frame(seq, image, source, now),
            None => {
                self.metrics.record_drop(DropReason::InvalidJpeg);
                log::warn!("frame {seq}: JPEG decode failed, dropped");
            }
        }
    }

    fn insert_frame(&mut self, seq: u32, image: RgbImage, source: Option<SocketAddr>, now: Instant) {
        let result = self.reorder.insert(seq, image, source, now, self.sync.synced());
        if result.skipped > 0 {
            self.metrics.record_skipped(result.skipped);
        }
        for delivered in result.delivered {
            self.delivered_total += 1;
            self.metrics.record_delivered();
            if self.delivered_total % self.log_frequency == 0 {
                match delivered.source {
                    Some(addr) => {
                        log::info!("frame {} delivered from {addr} ({} total)", delivered.seq, self.delivered_total)
                    }
                    None => {
                        log::info!("frame {} delivered, reassembled ({} total)", delivered.seq, self.delivered_total)
                    }
                }
            }
            if self.queue.push(delivered.image) {
                self.metrics.record_drop(DropReason::QueueFull);
                log::debug!("delivery queue full, shed oldest frame");
            }
        }
        self.drop_expired(&result.expired);
    }

    fn sweep(&mut self, now: Instant) {
        for seq in self.reassembler.sweep(now) {
            self.metrics.record_drop(DropReason::FragmentTimeout);
            log::warn!("discarding incomplete fragmented frame {seq}");
        }
        let expired = self.reorder.expire(now);
        self.drop_expired(&expired);
        if self.sync.check_liveness(now) {
            log::warn!(
                "no periodic sync for {}s, stream unstable",
                wire::SYNC_TIMEOUT.as_secs()
            );
        }
    }

    fn note_evicted(&mut self, evicted: &[u32]) {
        for _ in evicted {
            self.metrics.record_drop(DropReason::PendingOverflow);
        }
    }

    fn drop_expired(&mut self, expired: &[u32]) {
        for seq in expired {
            self.metrics.record_drop(DropReason::StaleFrame);
            log::debug!("frame {seq} expired in reorder buffer");
        }
    }
}
