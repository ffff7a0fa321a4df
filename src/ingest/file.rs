//! Local image-directory frame source.
//!
//! `ImageSequenceSource` replays the stills in a directory (jpg, jpeg, png),
//! one per frame, in file-name order. Only local paths are accepted; the
//! source ends with `SourceExhausted` after the last image.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceExhausted, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    connected: bool,
    last_error: Option<String>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let raw = dir.to_string_lossy();
        if !is_local_file_path(&raw) {
            return Err(anyhow!(
                "image sequences only support local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            next_index: 0,
            frame_count: 0,
            connected: false,
            last_error: None,
        })
    }

    /// Number of images found by `connect`.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("open image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("list image directory {}", self.dir.display()))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        files.sort();

        log::info!(
            "ImageSequenceSource: connected to {} ({} images)",
            self.dir.display(),
            files.len()
        );
        self.files = files;
        self.next_index = 0;
        self.connected = true;
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("{} is not connected", self.dir.display()));
        }
        let Some(path) = self.files.get(self.next_index) else {
            return Err(SourceExhausted.into());
        };
        self.next_index += 1;
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))
            .map_err(|err| {
                self.last_error = Some(format!("{err:#}"));
                err
            })?
            .to_rgb8();
        self.frame_count += 1;
        Ok(Frame::new(image, self.frame_count))
    }

    fn is_healthy(&self) -> bool {
        self.connected && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }

    fn release(&mut self) {
        self.connected = false;
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn is_local_file_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    !(lower.contains("://") || lower.starts_with("file:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::is_exhausted;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str, value: u8) {
        RgbImage::from_pixel(4, 3, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn replays_images_in_name_order_then_exhausts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_image(dir.path(), "b.png", 20);
        write_image(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = ImageSequenceSource::new(dir.path())?;
        source.connect()?;
        assert_eq!(source.len(), 2);

        let first = source.next_frame()?;
        assert_eq!(first.image().get_pixel(0, 0)[0], 10);
        assert_eq!(first.sequence, 1);
        let second = source.next_frame()?;
        assert_eq!(second.image().get_pixel(0, 0)[0], 20);

        let err = source.next_frame().err().expect("exhausted");
        assert!(is_exhausted(&err));
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = ImageSequenceSource::new(dir.path())?;
        assert!(source.connect().is_err());
        Ok(())
    }

    #[test]
    fn corrupt_image_is_an_error_not_exhaustion() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("broken.png"), b"not a png")?;
        let mut source = ImageSequenceSource::new(dir.path())?;
        source.connect()?;
        let err = source.next_frame().err().expect("decode failure");
        assert!(!is_exhausted(&err));
        assert!(!source.is_healthy());
        Ok(())
    }

    #[test]
    fn rejects_url_schemes() {
        assert!(ImageSequenceSource::new("file:///tmp/frames").is_err());
        assert!(ImageSequenceSource::new("http://cam/frames").is_err());
    }
}
