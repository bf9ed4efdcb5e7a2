//! Endpoint configuration.
//!
//! Both structs deserialize from any serde source and default every field
//! to the protocol constants in [`crate::wire`], so a TOML file needs to
//! name only what it overrides. Receiver-local knobs (queue depth, reorder
//! capacity, timeouts) are free to differ between deployments; the
//! wire-level values must match the peer.

use crate::error::{Error, Result};
use crate::wire;
use serde::Deserialize;
use std::time::Duration;

/// Sender endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// Destination as `host:port`.
    #[serde(default = "default_target")]
    pub target: String,

    /// Largest JPEG payload placed in a single datagram.
    #[serde(default = "default_max_packet")]
    pub max_packet: usize,

    /// JPEG quality, 1-100.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Milliseconds between periodic sync datagrams.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// `SO_SNDBUF` for the sending socket.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_bytes: usize,

    /// Microseconds to pause between fragment datagrams.
    #[serde(default = "default_fragment_pause_us")]
    pub fragment_pause_us: u64,
}

fn default_target() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_max_packet() -> usize {
    wire::MAX_PACKET
}
fn default_jpeg_quality() -> u8 {
    60
}
fn default_sync_interval_ms() -> u64 {
    wire::SYNC_INTERVAL.as_millis() as u64
}
fn default_send_buffer() -> usize {
    wire::SEND_BUFFER_BYTES
}
fn default_fragment_pause_us() -> u64 {
    wire::FRAGMENT_PAUSE.as_micros() as u64
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            max_packet: default_max_packet(),
            jpeg_quality: default_jpeg_quality(),
            sync_interval_ms: default_sync_interval_ms(),
            send_buffer_bytes: default_send_buffer(),
            fragment_pause_us: default_fragment_pause_us(),
        }
    }
}

impl SenderConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn fragment_pause(&self) -> Duration {
        Duration::from_micros(self.fragment_pause_us)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!("jpeg_quality must be 1-100, got {}", self.jpeg_quality)));
        }
        if self.max_packet == 0 {
            return Err(Error::Config("max_packet must be positive".to_string()));
        }
        if self.sync_interval_ms == 0 {
            return Err(Error::Config("sync_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Receiver endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    /// Address to bind the UDP socket, e.g. `0.0.0.0:5000`.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// `SO_RCVBUF` for the receiving socket.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_bytes: usize,

    /// Delivery queue depth toward the consumer.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Socket read timeout in milliseconds; sweeps run at least this often.
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,

    /// Delivery is logged once every this many frames.
    #[serde(default = "default_log_frequency")]
    pub log_frequency: u64,

    /// Reorder buffer capacity.
    #[serde(default = "default_max_reorder")]
    pub max_reorder: usize,

    /// Milliseconds before incomplete fragment sets and parked reorder
    /// entries are discarded.
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Upper bound on concurrently reassembling frames.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_recv_buffer() -> usize {
    wire::RECV_BUFFER_BYTES
}
fn default_queue_size() -> usize {
    wire::QUEUE_SIZE
}
fn default_socket_timeout_ms() -> u64 {
    wire::SOCKET_TIMEOUT.as_millis() as u64
}
fn default_log_frequency() -> u64 {
    30
}
fn default_max_reorder() -> usize {
    wire::MAX_REORDER
}
fn default_frame_timeout_ms() -> u64 {
    wire::FRAME_TIMEOUT.as_millis() as u64
}
fn default_max_pending() -> usize {
    16
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            recv_buffer_bytes: default_recv_buffer(),
            queue_size: default_queue_size(),
            socket_timeout_ms: default_socket_timeout_ms(),
            log_frequency: default_log_frequency(),
            max_reorder: default_max_reorder(),
            frame_timeout_ms: default_frame_timeout_ms(),
            max_pending: default_max_pending(),
        }
    }
}

impl ReceiverConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(Error::Config("queue_size must be positive".to_string()));
        }
        if self.max_reorder == 0 {
            return Err(Error::Config("max_reorder must be positive".to_string()));
        }
        if self.max_pending == 0 {
            return Err(Error::Config("max_pending must be positive".to_string()));
        }
        if self.socket_timeout_ms == 0 {
            return Err(Error::Config("socket_timeout_ms must be positive".to_string()));
        }
        if self.log_frequency == 0 {
            return Err(Error::Config("log_frequency must be positive".to_string()));
        }
        Ok(())
    }
}
