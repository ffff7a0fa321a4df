//! Synthetic scene source (`stub://name`).
//!
//! Renders a dark, slightly noisy backdrop and moves one bright square
//! through a fixed cycle of phases, `phase_frames` frames each:
//!
//! 1. empty scene
//! 2. square centered in the frame
//! 3. empty scene
//! 4. square in the lower-left corner
//!
//! With the default zone on a 640x480 frame this produces one ENTER and one
//! LEAVE per cycle, which is enough to exercise the whole pipeline without a
//! camera.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const OBJECT_COLOR: Rgb<u8> = Rgb([235, 235, 220]);

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub phase_frames: u64,
    /// Edge of the bright square in pixels.
    pub object_size: u32,
    /// Maximum per-pixel noise amplitude.
    pub noise: u8,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://synthetic".to_string(),
            width: 640,
            height: 480,
            phase_frames: 30,
            object_size: 60,
            noise: 6,
            seed: 0x5eed,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            frame_count: 0,
            connected: false,
        }
    }

    /// Center of the square for a 1-based frame number, if it is visible.
    pub fn object_center(&self, frame_number: u64) -> Option<(u32, u32)> {
        let phase_frames = self.config.phase_frames.max(1);
        let (w, h) = (self.config.width, self.config.height);
        match ((frame_number.saturating_sub(1)) / phase_frames) % 4 {
            1 => Some((w / 2, h / 2)),
            3 => Some((w / 6, h * 5 / 6)),
            _ => None,
        }
    }

    fn render(&mut self, frame_number: u64) -> RgbImage {
        let (w, h) = (self.config.width, self.config.height);
        let noise = self.config.noise as i16;
        let mut image = RgbImage::new(w, h);
        for (_, y, pixel) in image.enumerate_pixels_mut() {
            let shade = (y * 40 / h.max(1)) as i16;
            let jitter = if noise > 0 {
                self.rng.gen_range(-noise..=noise)
            } else {
                0
            };
            let base = [20 + shade, 30 + shade, 45 + shade];
            *pixel = Rgb(base.map(|c| (c + jitter).clamp(0, 255) as u8));
        }

        if let Some((cx, cy)) = self.object_center(frame_number) {
            let half = self.config.object_size / 2;
            let x0 = cx.saturating_sub(half);
            let y0 = cy.saturating_sub(half);
            let x1 = (cx + half).min(w);
            let y1 = (cy + half).min(h);
            for y in y0..y1 {
                for x in x0..x1 {
                    image.put_pixel(x, y, OBJECT_COLOR);
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.name.clone()
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!("synthetic source needs a non-empty frame size"));
        }
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.name,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("{} is not connected", self.config.name));
        }
        self.frame_count += 1;
        let image = self.render(self.frame_count);
        Ok(Frame::new(image, self.frame_count))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.name.clone(),
        }
    }

    fn release(&mut self) {
        self.connected = false;
    }
}
