//! drishti-stream: ordered delivery of live JPEG frames over UDP.
//!
//! A one-way transport between a frame producer (camera) and a frame
//! consumer (detection pipeline). The sender JPEG-encodes each frame,
//! stamps it with a wrapping sequence number, fragments oversized payloads
//! and advertises its stream identity out of band; the receiver
//! reassembles, reorders and hands frames over a bounded queue, trading
//! completeness for latency whenever packets never arrive.
//!
//! ```no_run
//! use drishti_stream::{ReceiverConfig, SenderConfig, VideoReceiver, VideoSender};
//! use std::time::Duration;
//!
//! # fn main() -> drishti_stream::Result<()> {
//! let receiver = VideoReceiver::bind(ReceiverConfig::default())?;
//! let sender = VideoSender::new(SenderConfig::default())?;
//!
//! let frame = image::RgbImage::new(640, 480);
//! sender.send_frame(&frame);
//!
//! if let Some(frame) = receiver.get_frame(Some(Duration::from_secs(1))) {
//!     println!("got a {}x{} frame", frame.width(), frame.height());
//! }
//! sender.release();
//! receiver.release();
//! # Ok(())
//! # }
//! ```
//!
//! There is no retransmission and no backpressure on the wire: a lost
//! fragment costs exactly its frame, a lost frame is eventually skipped,
//! and a slow consumer sees the freshest frames rather than a growing
//! backlog.

pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod receiver;
pub mod sender;
pub mod wire;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::{Error, Result};
pub use receiver::VideoReceiver;
pub use sender::{SenderStats, VideoSender};
