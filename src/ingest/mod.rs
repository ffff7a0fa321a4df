//! Frame sources.
//!
//! This module provides the sources the monitor can read from:
//! - Synthetic scenes (`stub://name`) for demos and tests
//! - Local image directories (one still per frame, sorted by file name)
//! - USB/V4L2 cameras (feature: ingest-v4l2), addressed as `/dev/videoN` or `N`
//!
//! Every source implements `FrameSource`. The pipeline owns a source through a
//! `CaptureGuard`, which releases the device exactly once however the frame
//! loop ends.
//!
//! Network URLs are rejected: capture is local-only.

mod file;
mod guard;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

pub use file::ImageSequenceSource;
pub use guard::CaptureGuard;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use crate::config::CameraSettings;
use crate::frame::Frame;

/// Returned (inside `anyhow::Error`) when a finite source has no more frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame source exhausted")]
pub struct SourceExhausted;

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A camera-like producer of frames.
pub trait FrameSource {
    /// Identifier used in logs.
    fn describe(&self) -> String;

    /// Open the underlying device or input.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    ///
    /// A finite source signals its end with `SourceExhausted`.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;

    /// Close the underlying device. Further captures fail.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// True when `err` means the source ran out of frames rather than failed.
pub fn is_exhausted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SourceExhausted>().is_some()
}

/// Pick a source implementation from a camera identifier.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let id = settings.source.trim();
    if id.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            name: id.to_string(),
            width: settings.width,
            height: settings.height,
            ..SyntheticConfig::default()
        })));
    }
    if is_camera_device(id) {
        #[cfg(feature = "ingest-v4l2")]
        {
            let device = if id.chars().all(|c| c.is_ascii_digit()) {
                format!("/dev/video{id}")
            } else {
                id.to_string()
            };
            return Ok(Box::new(V4l2Source::new(V4l2Config {
                device,
                target_fps: settings.target_fps,
                width: settings.width,
                height: settings.height,
            })?));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "camera device {} requires the ingest-v4l2 feature",
                id
            ));
        }
    }
    if id.contains("://") {
        return Err(anyhow!(
            "unsupported camera source {} (only stub://, local devices and image directories)",
            id
        ));
    }
    Ok(Box::new(ImageSequenceSource::new(id)?))
}

fn is_camera_device(id: &str) -> bool {
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())) || id.starts_with("/dev/video")
}
