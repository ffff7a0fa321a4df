//! Frame annotation and presentation.
//!
//! The monitor core never talks to a display. It hands every frame to a
//! `Renderer`, which may draw the overlay into the pixels and decide whether the
//! loop should keep going.
//!
//! Drawing happens in two passes. `annotate` marks the zone and detections
//! before an ENTER snapshot is written; `status` paints the occupancy banner
//! afterwards, so snapshots never lose their top rows.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::Rgb;
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::zone::Zone;

const ZONE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTSIDE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const INSIDE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const STATUS_IDLE: Rgb<u8> = Rgb([0, 0, 0]);
const STATUS_ALERT: Rgb<u8> = Rgb([160, 0, 0]);
const STATUS_BAR_HEIGHT: u32 = 25;
const CENTER_RADIUS: i32 = 4;
const LINE_WIDTH: i32 = 3;
const LABEL_SCALE: f32 = 16.0;

/// What the renderer should draw for one frame.
pub struct Overlay<'a> {
    pub zone: &'a Zone,
    /// Every detection the backend produced, before filtering.
    pub detections: &'a [Detection],
    pub confidence_threshold: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderControl {
    Continue,
    Stop,
}

pub trait Renderer {
    fn annotate(&mut self, frame: &mut Frame, overlay: &Overlay<'_>);

    /// Draw the occupancy indicator. Called after any snapshot is saved.
    fn status(&mut self, _frame: &mut Frame, _occupied: bool) {}

    /// Show the annotated frame. Returning `Stop` ends the frame loop.
    fn present(&mut self, frame: &Frame) -> Result<RenderControl>;
}

/// Draws nothing and never asks to stop.
#[derive(Default)]
pub struct HeadlessRenderer;

impl Renderer for HeadlessRenderer {
    fn annotate(&mut self, _frame: &mut Frame, _overlay: &Overlay<'_>) {}

    fn present(&mut self, _frame: &Frame) -> Result<RenderControl> {
        Ok(RenderControl::Continue)
    }
}

/// Draws the zone, confident detections and a status bar into each frame.
///
/// When a preview path is set, every `preview_every`-th presented frame is
/// written there so an operator can watch the feed without a window. Box
/// labels need a TrueType font; without one only the boxes are drawn.
pub struct OverlayRenderer {
    preview_path: Option<PathBuf>,
    preview_every: u64,
    presented: u64,
    label_font: Option<FontVec>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            preview_path: None,
            preview_every: 10,
            presented: 0,
            label_font: None,
        }
    }

    /// Load a `.ttf`/`.otf` font for `"<label> <confidence>"` captions.
    pub fn with_label_font(mut self, path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow!("{} is not a usable font", path.display()))?;
        self.label_font = Some(font);
        Ok(self)
    }

    pub fn with_preview(mut self, path: impl Into<PathBuf>, every: u64) -> Self {
        self.preview_path = Some(path.into());
        self.preview_every = every.max(1);
        self
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for OverlayRenderer {
    fn annotate(&mut self, frame: &mut Frame, overlay: &Overlay<'_>) {
        let image = frame.image_mut();
        let zone = overlay.zone;
        draw_thick_rect(image, zone.x1, zone.y1, zone.x2, zone.y2, ZONE_COLOR);

        for detection in overlay
            .detections
            .iter()
            .filter(|d| d.confidence >= overlay.confidence_threshold)
        {
            let bbox = &detection.bbox;
            let color = if zone.contains_center(bbox) {
                INSIDE_COLOR
            } else {
                OUTSIDE_COLOR
            };
            draw_box(image, bbox, color);
            draw_filled_circle_mut(image, bbox.center(), CENTER_RADIUS, color);
            if let Some(font) = &self.label_font {
                let y = (bbox.y1 - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(
                    image,
                    color,
                    bbox.x1,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &caption(detection),
                );
            }
        }
    }

    fn status(&mut self, frame: &mut Frame, occupied: bool) {
        let image = frame.image_mut();
        let status = if occupied { STATUS_ALERT } else { STATUS_IDLE };
        let bar_width = image.width();
        let bar_height = STATUS_BAR_HEIGHT.min(image.height());
        if bar_width > 0 && bar_height > 0 {
            draw_filled_rect_mut(image, Rect::at(0, 0).of_size(bar_width, bar_height), status);
        }
    }

    fn present(&mut self, frame: &Frame) -> Result<RenderControl> {
        self.presented += 1;
        if let Some(path) = &self.preview_path {
            if (self.presented - 1) % self.preview_every == 0 {
                frame
                    .image()
                    .save(path)
                    .with_context(|| format!("write preview {}", path.display()))?;
            }
        }
        Ok(RenderControl::Continue)
    }
}

/// Caption drawn above a box, confidence to two decimals.
pub fn caption(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

fn draw_box(image: &mut image::RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    draw_thick_rect(image, bbox.x1, bbox.y1, bbox.x2, bbox.y2, color);
}

fn draw_thick_rect(
    image: &mut image::RgbImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    color: Rgb<u8>,
) {
    for inset in 0..LINE_WIDTH {
        let width = x2 - x1 - 2 * inset;
        let height = y2 - y1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn blank() -> Frame {
        Frame::new(RgbImage::new(640, 480), 1)
    }

    fn overlay<'a>(zone: &'a Zone, detections: &'a [Detection]) -> Overlay<'a> {
        Overlay {
            zone,
            detections,
            confidence_threshold: 0.6,
        }
    }

    #[test]
    fn draws_zone_and_colors_boxes_by_position() {
        let zone = Zone::default();
        let detections = vec![
            Detection::new("person", 0.9, BoundingBox::new(300, 200, 360, 300).unwrap()),
            Detection::new("dog", 0.8, BoundingBox::new(10, 400, 60, 460).unwrap()),
            Detection::new("cat", 0.3, BoundingBox::new(500, 40, 560, 100).unwrap()),
        ];
        let mut frame = blank();
        OverlayRenderer::new().annotate(&mut frame, &overlay(&zone, &detections));

        let image = frame.image();
        assert_eq!(*image.get_pixel(200, 250), ZONE_COLOR);
        assert_eq!(*image.get_pixel(300, 220), INSIDE_COLOR);
        assert_eq!(*image.get_pixel(10, 430), OUTSIDE_COLOR);
        assert_eq!(*image.get_pixel(330, 250), INSIDE_COLOR);
        // Below threshold: not drawn.
        assert_eq!(*image.get_pixel(500, 70), Rgb([0, 0, 0]));
    }

    #[test]
    fn status_bar_turns_red_when_occupied() {
        let zone = Zone::default();
        let mut frame = blank();
        let mut renderer = OverlayRenderer::new();
        renderer.annotate(&mut frame, &overlay(&zone, &[]));
        assert_eq!(*frame.image().get_pixel(5, 5), Rgb([0, 0, 0]));
        renderer.status(&mut frame, true);
        assert_eq!(*frame.image().get_pixel(5, 5), STATUS_ALERT);
        renderer.status(&mut frame, false);
        assert_eq!(*frame.image().get_pixel(5, 5), STATUS_IDLE);
    }

    #[test]
    fn annotate_leaves_top_rows_untouched() {
        let zone = Zone::default();
        let detections = vec![Detection::new(
            "person",
            0.9,
            BoundingBox::new(300, 10, 350, 300).unwrap(),
        )];
        let mut frame = Frame::new(RgbImage::from_pixel(640, 480, Rgb([200, 200, 200])), 1);
        OverlayRenderer::new().annotate(&mut frame, &overlay(&zone, &detections));
        let image = frame.image();
        assert_eq!(*image.get_pixel(100, 5), Rgb([200, 200, 200]));
        assert_eq!(*image.get_pixel(320, 20), Rgb([200, 200, 200]));
        assert_eq!(*image.get_pixel(320, 10), INSIDE_COLOR);
    }

    #[test]
    fn caption_rounds_confidence() {
        let det = Detection::new("person", 0.876, BoundingBox::new(0, 0, 10, 10).unwrap());
        assert_eq!(caption(&det), "person 0.88");
    }

    #[test]
    fn label_font_must_be_a_font() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing.ttf");
        assert!(OverlayRenderer::new().with_label_font(&missing).is_err());

        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font")?;
        let err = OverlayRenderer::new()
            .with_label_font(&bogus)
            .err()
            .expect("bogus font rejected");
        assert!(err.to_string().contains("not a usable font"));
        Ok(())
    }

    #[test]
    fn preview_is_written_on_first_present() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preview.png");
        let mut renderer = OverlayRenderer::new().with_preview(&path, 5);
        assert_eq!(renderer.present(&blank())?, RenderControl::Continue);
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn headless_renderer_leaves_pixels_alone() -> Result<()> {
        let zone = Zone::default();
        let mut frame = blank();
        let mut renderer = HeadlessRenderer;
        renderer.annotate(&mut frame, &overlay(&zone, &[]));
        assert!(frame.pixels().iter().all(|&p| p == 0));
        assert_eq!(renderer.present(&frame)?, RenderControl::Continue);
        Ok(())
    }
}
