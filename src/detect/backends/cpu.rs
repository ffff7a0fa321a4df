use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const DEFAULT_DIFF_THRESHOLD: f32 = 40.0;
const DEFAULT_LEARNING_RATE: f32 = 0.05;
const DEFAULT_MIN_PIXELS: usize = 64;

/// CPU backend: background subtraction.
///
/// Keeps a running-average luminance background and reports the bounding box
/// of all foreground pixels as a single `"object"` detection. Confidence is the
/// fraction of the box covered by foreground. Foreground pixels are not
/// learned into the background, so a stationary object stays detected.
pub struct CpuBackend {
    background: Vec<f32>,
    width: u32,
    height: u32,
    diff_threshold: f32,
    learning_rate: f32,
    min_pixels: usize,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            background: Vec::new(),
            width: 0,
            height: 0,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            learning_rate: DEFAULT_LEARNING_RATE,
            min_pixels: DEFAULT_MIN_PIXELS,
        }
    }

    /// Override the minimum foreground size for a detection.
    pub fn with_min_pixels(mut self, min_pixels: usize) -> Self {
        self.min_pixels = min_pixels.max(1);
        self
    }

    fn reset(&mut self, luma: Vec<f32>, width: u32, height: u32) {
        self.background = luma;
        self.width = width;
        self.height = height;
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn luminance(pixels: &[u8]) -> Vec<f32> {
    pixels
        .chunks_exact(3)
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .collect()
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (width, height) = (frame.width(), frame.height());
        let luma = luminance(frame.pixels());

        // First frame, or the source changed resolution: learn and wait.
        if self.background.len() != luma.len() || self.width != width || self.height != height {
            self.reset(luma, width, height);
            return Ok(Vec::new());
        }

        let w = width as usize;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
        let mut foreground = 0usize;

        for (i, (bg, &value)) in self.background.iter_mut().zip(&luma).enumerate() {
            if (value - *bg).abs() > self.diff_threshold {
                let (x, y) = (i % w, i / w);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                foreground += 1;
            } else {
                *bg += self.learning_rate * (value - *bg);
            }
        }

        if foreground < self.min_pixels {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as i32,
            min_y as i32,
            max_x as i32 + 1,
            max_y as i32 + 1,
        )?;
        let confidence = (foreground as f64 / bbox.area() as f64).min(1.0) as f32;
        Ok(vec![Detection::new("object", confidence, bbox)])
    }
}
