use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    #[serde(alias = "jpeg")]
    Jpg,
    Png,
}

impl SnapshotFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(SnapshotFormat::Jpg),
            "png" => Ok(SnapshotFormat::Png),
            other => Err(anyhow!("unsupported snapshot format {:?} (jpg|png)", other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Jpg => "jpg",
            SnapshotFormat::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            SnapshotFormat::Jpg => ImageFormat::Jpeg,
            SnapshotFormat::Png => ImageFormat::Png,
        }
    }
}

/// Snapshot name for an ENTER at `timestamp`.
///
/// Second resolution: two entries within the same second share a name and the
/// later one overwrites the earlier.
pub fn snapshot_file_name(timestamp: NaiveDateTime, format: SnapshotFormat) -> String {
    format!(
        "redzone_capture_{}.{}",
        timestamp.format("%H%M%S"),
        format.extension()
    )
}

/// Persists a frame as an image file.
pub trait SnapshotWriter {
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<()>;
}

/// Encodes snapshots with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageSnapshotWriter {
    format: SnapshotFormat,
}

impl ImageSnapshotWriter {
    pub fn new(format: SnapshotFormat) -> Self {
        Self { format }
    }
}

impl SnapshotWriter for ImageSnapshotWriter {
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<()> {
        frame
            .image()
            .save_with_format(path, self.format.image_format())
            .with_context(|| format!("encode snapshot {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn file_name_is_zero_padded_hms() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(7, 3, 9)
            .unwrap();
        assert_eq!(
            snapshot_file_name(ts, SnapshotFormat::Jpg),
            "redzone_capture_070309.jpg"
        );
        assert_eq!(
            snapshot_file_name(ts, SnapshotFormat::Png),
            "redzone_capture_070309.png"
        );
    }

    #[test]
    fn parses_known_formats() {
        assert_eq!(SnapshotFormat::parse("JPEG").unwrap(), SnapshotFormat::Jpg);
        assert_eq!(SnapshotFormat::parse("png").unwrap(), SnapshotFormat::Png);
        assert!(SnapshotFormat::parse("gif").is_err());
    }

    #[test]
    fn writes_decodable_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snap.png");
        let frame = Frame::from_rgb(vec![200u8; 4 * 3 * 3], 4, 3, 1)?;
        ImageSnapshotWriter::new(SnapshotFormat::Png).write(&frame, &path)?;
        let decoded = image::open(&path)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.as_raw(), frame.pixels());
        Ok(())
    }
}
