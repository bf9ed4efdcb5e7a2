//! JPEG frame helpers shared by both endpoints.

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
/// Anything shorter than this cannot be a real camera frame.
pub const MIN_JPEG_LEN: usize = 100;

/// Pixel dimensions of a frame as carried on the wire, in the row-major
/// (height, width, channels) order the consumer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub height: u32,
    pub width: u32,
    pub channels: u8,
}

impl FrameShape {
    pub fn of(image: &RgbImage) -> Self {
        Self { height: image.height(), width: image.width(), channels: 3 }
    }
}

/// Encodes an RGB frame to JPEG at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(buf)
}

/// Decodes a JPEG payload to RGB, returning `None` when the payload is not
/// decodable. The transport drops such frames rather than failing.
pub fn decode_jpeg(data: &[u8]) -> Option<RgbImage> {
    match image::load_from_memory_with_format(data, ImageFormat::Jpeg) {
        Ok(decoded) => Some(decoded.to_rgb8()),
        Err(err) => {
            log::debug!("JPEG decode failed: {err}");
            None
        }
    }
}

pub fn has_jpeg_header(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == JPEG_SOI
}

pub fn has_jpeg_footer(data: &[u8]) -> bool {
    data.len() >= 2 && data[data.len() - 2..] == JPEG_EOI
}

/// Pre-send verification of an encoded frame. A payload that fails any of
/// these checks would only waste fragments on the wire, so the sender drops
/// the frame without advancing its sequence number.
pub fn verify_jpeg(data: &[u8]) -> std::result::Result<(), &'static str> {
    if data.len() < MIN_JPEG_LEN {
        return Err("payload shorter than a plausible JPEG");
    }
    if !has_jpeg_header(data) {
        return Err("missing start-of-image marker");
    }
    if image::load_from_memory_with_format(data, ImageFormat::Jpeg).is_err() {
        return Err("not locally decodable");
    }
    Ok(())
}
