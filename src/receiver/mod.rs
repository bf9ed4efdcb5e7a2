//! Receiver endpoint.
//!
//! [`VideoReceiver`] binds the UDP socket, spawns the ingress thread and
//! exposes the consumer API: ordered frames from a bounded queue, the
//! current stream identity for derived-state resets, and metrics. All
//! protocol state lives inside the ingress thread; this handle only holds
//! the shared edges.

mod ingress;
pub(crate) mod queue;
pub mod reassembly;
pub mod reorder;
pub mod sync;

use crate::config::ReceiverConfig;
use crate::error::{Error, Result};
use crate::metrics::{MetricsSnapshot, TransportMetrics};
use image::RgbImage;
use ingress::Ingress;
use parking_lot::Mutex;
use queue::QueueConsumer;
use reassembly::FrameReassembler;
use reorder::ReorderBuffer;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sync::SyncTracker;

/// Consumer-facing receiver handle.
pub struct VideoReceiver {
    stop: Arc<AtomicBool>,
    queue: QueueConsumer<RgbImage>,
    stream_id: Arc<Mutex<Option<u32>>>,
    metrics: Arc<TransportMetrics>,
    local_addr: SocketAddr,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl VideoReceiver {
    /// Binds the configured address and starts the ingress thread.
    pub fn bind(config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let socket = build_socket(&config)?;
        let local_addr = socket.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let stream_id = Arc::new(Mutex::new(None));
        let metrics = Arc::new(TransportMetrics::new());
        let (producer, consumer) = queue::bounded_dropping(config.queue_size);

        let ingress = Ingress::new(
            socket,
            Arc::clone(&stop),
            producer,
            ReorderBuffer::new(config.max_reorder, config.frame_timeout()),
            FrameReassembler::new(config.max_pending, config.frame_timeout()),
            SyncTracker::new(crate::wire::SYNC_TIMEOUT),
            Arc::clone(&stream_id),
            Arc::clone(&metrics),
            config.log_frequency,
        );
        let handle = std::thread::Builder::new()
            .name("drishti-ingress".to_string())
            .spawn(move || ingress.run())
            .map_err(Error::Io)?;

        log::info!(
            "UDP receiver listening on {local_addr} (queue {}, reorder {}, recv buffer {} bytes)",
            config.queue_size,
            config.max_reorder,
            config.recv_buffer_bytes
        );

        Ok(Self { stop, queue: consumer, stream_id, metrics, local_addr, handle: Mutex::new(Some(handle)) })
    }

    /// Address the socket actually bound, useful with a port of 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next frame in sequence order. Blocks up to `timeout` (or forever
    /// when `None`); returns `None` on timeout or once released.
    pub fn get_frame(&self, timeout: Option<Duration>) -> Option<RgbImage> {
        if self.stop.load(Ordering::Relaxed) {
            return None;
        }
        self.queue.pop(timeout)
    }

    /// Identity of the stream currently being followed. Consumers compare
    /// successive values to reset trackers and counters on stream change.
    pub fn get_stream_id(&self) -> Option<u32> {
        *self.stream_id.lock()
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.lock().as_ref().map(|handle| !handle.is_finished()).unwrap_or(false)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops and joins the ingress thread. Safe to call more than once.
    pub fn release(&self) {
        if self.stop.swap(true, Ordering::Relaxed) {
            return;
        }
        self.wake_ingress();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("receiver ingress thread panicked");
            }
        }
        log::info!("UDP receiver closed");
    }

    /// Unblocks the ingress read with an empty datagram so release does
    /// not wait out the socket timeout.
    fn wake_ingress(&self) {
        let loopback_bind: SocketAddr = match self.local_addr {
            SocketAddr::V4(_) => (Ipv4Addr::LOCALHOST, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::LOCALHOST, 0).into(),
        };
        let mut target = self.local_addr;
        if target.ip().is_unspecified() {
            let loopback: IpAddr = match target {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            };
            target.set_ip(loopback);
        }
        match UdpSocket::bind(loopback_bind) {
            Ok(waker) => {
                if let Err(err) = waker.send_to(&[], target) {
                    log::debug!("receiver wake-up send failed: {err}");
                }
            }
            Err(err) => log::debug!("receiver wake-up socket failed: {err}"),
        }
    }
}

impl Drop for VideoReceiver {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_socket(config: &ReceiverConfig) -> Result<UdpSocket> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|err| Error::Config(format!("invalid bind address {}: {err}", config.bind)))?;
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_recv_buffer_size(config.recv_buffer_bytes)?;
    socket.bind(&addr.into())?;
    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(config.socket_timeout()))?;
    Ok(socket)
}
