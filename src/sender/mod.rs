//! Sender endpoint.
//!
//! [`VideoSender`] turns raw RGB frames into wire datagrams: encode to
//! JPEG, attach the next sequence number, send in one datagram or fragment
//! when oversized, and advance the sequence only after the frame actually
//! left the socket. A background thread advertises the stream with
//! periodic sync datagrams from the first frame onward.
//!
//! The calling task and the sync emitter share one mutex over the
//! (sequence, stream, socket) bundle. The emitter only reads the sequence;
//! contention is a few microseconds every few seconds.

pub mod fragment;
mod sync;

use crate::config::SenderConfig;
use crate::error::{Error, Result};
use crate::frame::{self, FrameShape};
use crate::wire::{self, Datagram, SyncMessage, WholeFrame, MAX_SEQ};
use image::RgbImage;
use parking_lot::Mutex;
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sync::SyncEmitter;

/// Snapshot of sender-side counters.
#[derive(Debug, Clone)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub current_seq: u32,
    pub fragmented_frames: u64,
    pub failed_sends: u64,
    pub target: String,
}

pub(crate) struct SenderShared {
    config: SenderConfig,
    target: Option<SocketAddr>,
    socket: Option<UdpSocket>,
    stream_id: u32,
    seq: u32,
    frame_count: u64,
    sync_seq: u64,
    streaming: bool,
    fragmented_frames: u64,
    failed_sends: u64,
    last_progress_log: Instant,
}

impl SenderShared {
    fn ensure_socket(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let target = self
            .target
            .ok_or_else(|| Error::Config(format!("unresolvable target {}", self.config.target)))?;
        match build_socket(target, self.config.send_buffer_bytes) {
            Ok(socket) => {
                log::info!("UDP sender ready, target {target}");
                self.socket = Some(socket);
                Ok(())
            }
            Err(err) => {
                log::error!("UDP sender socket setup failed: {err}");
                Err(err)
            }
        }
    }

    fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::NotConnected)))?;
        let target = self
            .target
            .ok_or_else(|| Error::Config(format!("unresolvable target {}", self.config.target)))?;
        socket.send_to(bytes, target)?;
        Ok(())
    }

    /// Emits one sync datagram advertising the sequence the next frame
    /// will carry. Restart syncs are always logged; periodic ones every
    /// second emission.
    pub(crate) fn emit_sync(&mut self, is_new_stream: bool) {
        if self.ensure_socket().is_err() {
            return;
        }
        let message = SyncMessage {
            stream_id: self.stream_id,
            sync_seq: self.sync_seq,
            current_seq: self.seq,
            frame_count: self.frame_count,
            timestamp: wall_clock_seconds(),
            is_new_stream,
        };
        match wire::encode_datagram(&Datagram::Sync(message)).and_then(|bytes| self.send_bytes(&bytes)) {
            Ok(()) => {
                if is_new_stream {
                    log::info!("sync: stream {} starting at sequence {}", self.stream_id, self.seq);
                } else if self.sync_seq % 2 == 0 {
                    log::info!("sync {} sent, sequence {}", self.sync_seq, self.seq);
                }
                self.sync_seq += 1;
            }
            Err(err) => log::warn!("failed to send sync: {err}"),
        }
    }

    fn send_one(&mut self, image: &RgbImage) -> bool {
        let jpeg = match frame::encode_jpeg(image, self.config.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                log::warn!("frame {}: JPEG encoding failed: {err}", self.seq);
                return false;
            }
        };
        let shape = FrameShape::of(image);
        let datagram = Datagram::WholeFrame(WholeFrame {
            seq: self.seq,
            jpeg_data: jpeg,
            timestamp: wall_clock_seconds(),
            frame_shape: shape,
            frame_count: self.frame_count,
            stream_id: self.stream_id,
        });
        let encoded = match wire::encode_datagram(&datagram) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("frame {}: datagram encoding failed: {err}", self.seq);
                return false;
            }
        };

        if encoded.len() <= self.config.max_packet {
            return match self.send_bytes(&encoded) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("frame {}: send failed: {err}", self.seq);
                    false
                }
            };
        }

        if let Datagram::WholeFrame(whole) = datagram {
            self.send_fragmented(&whole.jpeg_data, shape)
        } else {
            false
        }
    }

    fn send_fragmented(&mut self, jpeg: &[u8], shape: FrameShape) -> bool {
        if let Err(reason) = frame::verify_jpeg(jpeg) {
            log::warn!("frame {}: invalid JPEG ({reason}), dropped", self.seq);
            return false;
        }
        let datagrams =
            fragment::fragment_frame(jpeg, self.seq, shape, self.frame_count, self.stream_id, self.config.max_packet);
        let pause = self.config.fragment_pause();
        let body_count = datagrams.len() - 1;
        for datagram in &datagrams {
            let bytes = match wire::encode_datagram(datagram) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::warn!("frame {}: fragment encoding failed: {err}", self.seq);
                    return false;
                }
            };
            if let Err(err) = self.send_bytes(&bytes) {
                log::warn!("frame {}: fragment send failed: {err}", self.seq);
                return false;
            }
            if matches!(datagram, Datagram::FragmentBody(_)) && !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }
        log::trace!("frame {} sent as {body_count} fragments", self.seq);
        self.fragmented_frames += 1;
        true
    }
}

/// Producer-facing sender handle.
pub struct VideoSender {
    shared: Arc<Mutex<SenderShared>>,
    sync_interval: Duration,
    emitter: Mutex<Option<SyncEmitter>>,
}

impl VideoSender {
    /// Creates a sender for the configured target and announces the new
    /// stream. Socket problems are logged and retried on the next frame;
    /// only an invalid configuration fails construction.
    pub fn new(config: SenderConfig) -> Result<Self> {
        config.validate()?;
        let target = match config.target.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(err) => {
                log::error!("cannot resolve target {}: {err}", config.target);
                None
            }
        };
        let stream_id = rand::thread_rng().gen_range(0..(1u32 << 31));
        let sync_interval = config.sync_interval();
        let shared = Arc::new(Mutex::new(SenderShared {
            config,
            target,
            socket: None,
            stream_id,
            seq: 0,
            frame_count: 0,
            sync_seq: 0,
            streaming: false,
            fragmented_frames: 0,
            failed_sends: 0,
            last_progress_log: Instant::now(),
        }));
        {
            let mut locked = shared.lock();
            if locked.ensure_socket().is_ok() {
                locked.emit_sync(true);
            }
        }
        Ok(Self { shared, sync_interval, emitter: Mutex::new(None) })
    }

    pub fn stream_id(&self) -> u32 {
        self.shared.lock().stream_id
    }

    /// Encodes and sends one frame. Returns `false` on encode or socket
    /// failure, in which case the sequence number does not advance.
    pub fn send_frame(&self, image: &RgbImage) -> bool {
        let start_emitter = {
            let mut shared = self.shared.lock();
            if shared.ensure_socket().is_err() {
                shared.failed_sends += 1;
                return false;
            }
            if shared.seq >= MAX_SEQ {
                log::info!("sequence limit reached, restarting stream {} at 0", shared.stream_id);
                shared.seq = 0;
                shared.emit_sync(true);
            }
            if !shared.send_one(image) {
                shared.failed_sends += 1;
                return false;
            }
            shared.seq += 1;
            shared.frame_count += 1;
            if shared.last_progress_log.elapsed() >= Duration::from_secs(1) {
                log::info!("frame {} sent ({} total)", shared.seq, shared.frame_count);
                shared.last_progress_log = Instant::now();
            }
            let first_frame = !shared.streaming;
            shared.streaming = true;
            first_frame
        };
        if start_emitter {
            self.start_emitter();
        }
        true
    }

    pub fn stats(&self) -> SenderStats {
        let shared = self.shared.lock();
        SenderStats {
            frames_sent: shared.frame_count,
            current_seq: shared.seq,
            fragmented_frames: shared.fragmented_frames,
            failed_sends: shared.failed_sends,
            target: shared.config.target.clone(),
        }
    }

    /// Stops the sync emitter and closes the socket. Safe to call more
    /// than once.
    pub fn release(&self) {
        let emitter = self.emitter.lock().take();
        if let Some(emitter) = emitter {
            emitter.stop();
        }
        let mut shared = self.shared.lock();
        if shared.socket.is_some() || shared.streaming {
            shared.streaming = false;
            shared.socket = None;
            log::info!("UDP sender closed");
        }
    }

    fn start_emitter(&self) {
        let mut slot = self.emitter.lock();
        if slot.is_some() {
            return;
        }
        match SyncEmitter::spawn(Arc::clone(&self.shared), self.sync_interval) {
            Ok(emitter) => *slot = Some(emitter),
            Err(err) => log::error!("failed to start sync emitter: {err}"),
        }
    }
}

impl Drop for VideoSender {
    fn drop(&mut self) {
        self.release();
    }
}

fn wall_clock_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs_f64()).unwrap_or_default()
}

fn build_socket(target: SocketAddr, send_buffer_bytes: usize) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_send_buffer_size(send_buffer_bytes)?;
    let bind_addr = match target {
        SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
    };
    socket.bind(&bind_addr.into())?;
    Ok(socket.into())
}
