//! Demo sender: streams a synthetic moving test pattern.

use clap::Parser;
use drishti_stream::{SenderConfig, VideoSender};
use image::{Rgb, RgbImage};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "drishti-send", about = "Stream synthetic video frames over UDP")]
struct Args {
    /// Destination as host:port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    target: String,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Frames per second.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// JPEG quality, 1-100.
    #[arg(long, default_value_t = 60)]
    quality: u8,

    /// Stop after this many frames; runs forever when omitted.
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> drishti_stream::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let sender = VideoSender::new(SenderConfig {
        target: args.target.clone(),
        jpeg_quality: args.quality,
        ..Default::default()
    })?;
    log::info!("streaming {}x{} at {} fps to {} (stream {})", args.width, args.height, args.fps, args.target, sender.stream_id());

    let interval = Duration::from_secs_f64(1.0 / args.fps.max(0.1));
    let mut tick: u64 = 0;
    loop {
        if let Some(limit) = args.frames {
            if tick >= limit {
                break;
            }
        }
        let frame = test_pattern(args.width, args.height, tick);
        if !sender.send_frame(&frame) {
            log::warn!("frame {tick} not sent");
        }
        tick += 1;
        std::thread::sleep(interval);
    }

    let stats = sender.stats();
    log::info!("done: {} frames sent, {} fragmented, {} failed", stats.frames_sent, stats.fragmented_frames, stats.failed_sends);
    sender.release();
    Ok(())
}

fn test_pattern(width: u32, height: u32, tick: u64) -> RgbImage {
    let shift = (tick % 256) as u32;
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([((x + shift) % 256) as u8, (y % 256) as u8, (((x ^ y) + shift) % 256) as u8])
    })
}
