//! Captured frames.
//!
//! A `Frame` owns one RGB8 image plus the capture metadata the pipeline needs:
//! - `sequence`: per-source counter starting at 1
//! - `captured_at`: local wall-clock time of capture
//!
//! Detectors read the pixels, renderers draw into them in place, and the event
//! logger writes them out as snapshots.

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDateTime};
use image::RgbImage;

pub struct Frame {
    image: RgbImage,
    pub sequence: u64,
    pub captured_at: NaiveDateTime,
}

impl Frame {
    /// Wrap a decoded image, stamping it with the current local time.
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self::captured(image, sequence, Local::now().naive_local())
    }

    pub fn captured(image: RgbImage, sequence: u64, captured_at: NaiveDateTime) -> Self {
        Self {
            image,
            sequence,
            captured_at,
        }
    }

    /// Build a frame from a packed RGB24 buffer.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Packed RGB24 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
        let frame = Frame::from_rgb(vec![7u8; 12], 2, 2, 1).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.pixels().len(), 12);
    }
}
