use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::record::LogRecord;
use super::snapshot::{snapshot_file_name, ImageSnapshotWriter, SnapshotFormat, SnapshotWriter};
use crate::error::LogError;
use crate::frame::Frame;
use crate::occupancy::ZoneEvent;

/// What the logger persisted for one event.
#[derive(Clone, Debug)]
pub struct LogReceipt {
    pub record: LogRecord,
    /// Snapshot written for an ENTER event.
    pub snapshot: Option<PathBuf>,
}

/// Append-only JSON Lines event log with ENTER snapshots.
///
/// The log file is opened in append mode for every event, so external rotation
/// between events is picked up. Each line is synced before `log` returns.
pub struct EventLogger {
    log_path: PathBuf,
    snapshot_dir: PathBuf,
    snapshot_format: SnapshotFormat,
    snapshots: Box<dyn SnapshotWriter>,
}

impl EventLogger {
    pub fn new(
        log_path: impl Into<PathBuf>,
        snapshot_dir: impl Into<PathBuf>,
        snapshot_format: SnapshotFormat,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            snapshot_dir: snapshot_dir.into(),
            snapshot_format,
            snapshots: Box::new(ImageSnapshotWriter::new(snapshot_format)),
        }
    }

    /// Replace the snapshot encoder.
    pub fn with_snapshot_writer<W: SnapshotWriter + 'static>(mut self, writer: W) -> Self {
        self.snapshots = Box::new(writer);
        self
    }

    /// Create the log's parent directory and the snapshot directory.
    pub fn prepare(&self) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
        }
        std::fs::create_dir_all(&self.snapshot_dir).with_context(|| {
            format!("create snapshot directory {}", self.snapshot_dir.display())
        })?;
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Persist one zone event.
    ///
    /// The log line is written first. For ENTER the frame is then saved as a
    /// snapshot; a snapshot failure is reported as `LogError::Snapshot` and does
    /// not affect the line already written. When the append fails no snapshot is
    /// attempted.
    pub fn log(&mut self, event: &ZoneEvent, frame: &Frame) -> Result<LogReceipt, LogError> {
        let record = LogRecord::from_event(event);
        let line = record.to_line()?;
        self.append(&line)?;

        let snapshot = match event {
            ZoneEvent::Enter { .. } => {
                let path = self
                    .snapshot_dir
                    .join(snapshot_file_name(record.timestamp, self.snapshot_format));
                self.snapshots
                    .write(frame, &path)
                    .map_err(|err| LogError::Snapshot {
                        path: path.clone(),
                        message: format!("{err:#}"),
                    })?;
                Some(path)
            }
            ZoneEvent::Leave { .. } => None,
        };

        Ok(LogReceipt { record, snapshot })
    }

    fn append(&self, line: &str) -> Result<(), LogError> {
        let write_err = |source| LogError::Write {
            path: self.log_path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(write_err)?;
        writeln!(file, "{line}").map_err(write_err)?;
        file.sync_data().map_err(write_err)?;
        Ok(())
    }
}
