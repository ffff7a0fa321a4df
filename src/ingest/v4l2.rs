//! V4L2 frame source.
//!
//! `V4l2Source` captures from a local USB camera through libv4l. The device is
//! asked for RGB24; drivers that refuse fall back to whatever they report, and
//! YUYV output is converted in-memory.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const MMAP_BUFFERS: u32 = 4;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate. 0 leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if !config.device.starts_with("/dev/") {
            return Err(anyhow!("v4l2 device must be a /dev path, got {}", config.device));
        }
        Ok(Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    /// Six frame periods without a frame, but never less than two seconds.
    fn health_grace(&self) -> Duration {
        let period_ms = match self.config.target_fps {
            0 => 0,
            fps => 1000 / fps as u64,
        };
        Duration::from_millis((period_ms * 6).max(2_000))
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn connect(&mut self) -> Result<()> {
        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open camera {}", self.config.device))?;
        let format = negotiate_format(&mut device, &self.config)?;
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} only offers {}; RGB3 or YUYV is required",
                self.config.device,
                format.fourcc
            )
        })?;
        request_fps(&mut device, &self.config);
        (self.active_width, self.active_height) = (format.width, format.height);

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(
                    device,
                    v4l::buffer::Type::VideoCapture,
                    MMAP_BUFFERS,
                )
                .context("map capture buffers")
            },
        }
        .try_build();
        match state {
            Ok(state) => {
                self.state = Some(state);
                self.last_error = None;
            }
            Err(err) => {
                self.last_error = Some(format!("{err:#}"));
                return Err(err);
            }
        }

        log::info!(
            "V4l2Source: streaming {} at {}x{} ({:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;
        let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(rgb, self.active_width, self.active_height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.device.clone(),
        }
    }

    fn release(&mut self) {
        // Dropping the stream unmaps the buffers and closes the fd.
        self.state = None;
    }
}

/// Ask for RGB24 at the configured size and return what the driver settled on.
fn negotiate_format(device: &mut v4l::Device, config: &V4l2Config) -> Result<v4l::Format> {
    use v4l::video::Capture;

    let mut wanted = device.format().context("query camera format")?;
    wanted.width = config.width;
    wanted.height = config.height;
    wanted.fourcc = v4l::FourCC::new(b"RGB3");
    match device.set_format(&wanted) {
        Ok(applied) => Ok(applied),
        Err(err) => {
            log::warn!(
                "V4l2Source: {} rejected RGB3 {}x{} ({}); keeping driver format",
                config.device,
                config.width,
                config.height,
                err
            );
            device.format().context("query camera format")
        }
    }
}

/// Best-effort frame rate request; drivers may ignore it.
fn request_fps(device: &mut v4l::Device, config: &V4l2Config) {
    use v4l::video::Capture;

    if config.target_fps == 0 {
        return;
    }
    let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
    if let Err(err) = device.set_params(&params) {
        log::warn!(
            "V4l2Source: {} ignored {} fps request: {}",
            config.device,
            config.target_fps,
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_device_paths() {
        let config = V4l2Config {
            device: "stub://cam".to_string(),
            ..V4l2Config::default()
        };
        assert!(V4l2Source::new(config).is_err());
    }

    #[test]
    fn unconnected_source_is_unhealthy() -> Result<()> {
        let mut source = V4l2Source::new(V4l2Config::default())?;
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        assert_eq!(source.stats().frames_captured, 0);
        Ok(())
    }

    #[test]
    fn health_grace_scales_with_fps() -> Result<()> {
        let config = V4l2Config {
            target_fps: 1,
            ..V4l2Config::default()
        };
        let source = V4l2Source::new(config)?;
        assert_eq!(source.health_grace(), Duration::from_millis(6_000));
        Ok(())
    }
}
