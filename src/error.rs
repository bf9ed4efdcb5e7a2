//! Error types for drishti-stream
//!
//! Most transport-level failures are not surfaced through this enum at all:
//! the wire favours latency over completeness, so malformed datagrams,
//! undecodable JPEG payloads, fragment timeouts and queue overflows are
//! logged, counted in [`crate::metrics::TransportMetrics`] and dropped on
//! the spot. `Error` covers the failures a caller can actually act on:
//!
//! - **`Io`**: socket setup or send/receive errors. The sender reports these
//!   as a `false` return from `send_frame` and retries socket setup on the
//!   next frame; the receiver fails `bind` outright.
//! - **`Image`**: JPEG encoding of an outbound frame failed. The frame is
//!   skipped and the sequence number does not advance.
//! - **`Encode` / `Malformed`**: CBOR serialization problems. `Malformed` on
//!   the receive path means the datagram matched none of the four wire
//!   shapes and was discarded.
//! - **`Config`**: invalid configuration, fix and restart.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JPEG codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("datagram encoding error: {0}")]
    Encode(String),

    #[error("malformed datagram: {0}")]
    Malformed(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
