//! Frame sample type.
//!
//! A `Frame` is one decoded image sample from the stream: RGB pixels, the
//! supervisor-assigned sequence number, and the capture instant. Frames are
//! ephemeral. Exactly one stage owns a frame at a time; a frame that arrives
//! while recognition is busy is dropped, never queued.

use std::io::Cursor;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};

/// One image sample from the stream.
#[derive(Debug)]
pub struct Frame {
    /// Monotonically increasing across the whole run, including reconnects.
    pub seq: u64,
    pub captured_at: Instant,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(seq: u64, captured_at: Instant, image: RgbImage) -> Self {
        Self {
            seq,
            captured_at,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Encode RGB pixels as JPEG, for an event's representative image.
pub(crate) fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("encode frame as jpeg")?;
    Ok(bytes)
}

/// Decode a JPEG buffer into RGB pixels.
pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg frame")?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn solid_image(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([value, value, value]))
    }

    #[test]
    fn jpeg_round_trip_preserves_dimensions() -> Result<()> {
        let jpeg = encode_jpeg(&solid_image(64, 48, 128))?;
        let decoded = decode_jpeg(&jpeg)?;
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
        Ok(())
    }

    #[test]
    fn frame_reports_image_dimensions() {
        let frame = Frame::new(1, Instant::now(), solid_image(64, 48, 128));
        assert_eq!((frame.width(), frame.height()), (64, 48));
    }
}
