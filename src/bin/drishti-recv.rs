//! Demo receiver: logs the ordered frame stream until interrupted.

use clap::Parser;
use drishti_stream::{ReceiverConfig, VideoReceiver};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "drishti-recv", about = "Receive an ordered UDP video frame stream")]
struct Args {
    /// Address to bind, e.g. 0.0.0.0:5000.
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Delivery queue depth.
    #[arg(long, default_value_t = 10)]
    queue_size: usize,
}

fn main() -> drishti_stream::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let receiver = VideoReceiver::bind(ReceiverConfig {
        bind: args.bind,
        queue_size: args.queue_size,
        ..Default::default()
    })?;

    let mut current_stream: Option<u32> = None;
    let mut received: u64 = 0;
    while !shutdown.load(Ordering::Relaxed) {
        let Some(frame) = receiver.get_frame(Some(Duration::from_millis(500))) else {
            continue;
        };
        received += 1;

        let stream = receiver.get_stream_id();
        if stream != current_stream {
            // A consumer would reset counters and tracks here.
            log::info!("stream changed: {current_stream:?} -> {stream:?}");
            current_stream = stream;
        }
        if received % 30 == 0 {
            log::info!("{received} frames received, latest {}x{}", frame.width(), frame.height());
        }
    }

    receiver.release();
    let snapshot = receiver.metrics();
    log::info!(
        "done: {} datagrams, {} frames delivered, {} skipped",
        snapshot.datagrams_total,
        snapshot.frames_delivered,
        snapshot.frames_skipped
    );
    for (reason, count) in snapshot.drops {
        if count > 0 {
            log::info!("dropped {count} ({reason})");
        }
    }
    Ok(())
}
