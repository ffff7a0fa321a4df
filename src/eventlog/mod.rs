//! Durable zone event log.
//!
//! Events are appended as JSON Lines, one self-contained object per line:
//! - ENTER: `{"event":"Object ENTERED red zone","timestamp":...,"objects":[...]}`
//! - LEAVE: `{"event":"Object LEFT red zone","timestamp":...}`
//!
//! Each ENTER also saves the annotated frame as `redzone_capture_HHMMSS.<ext>`.
//! The log is never rewritten; readers here only parse and check it.

mod logger;
mod record;
mod snapshot;

use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

pub use logger::{EventLogger, LogReceipt};
pub use record::{round_confidence, EventTag, LogRecord, LoggedObject, TIMESTAMP_FORMAT};
pub use snapshot::{snapshot_file_name, ImageSnapshotWriter, SnapshotFormat, SnapshotWriter};

use crate::occupancy::ZoneEventKind;

/// Parse every record of a log file. Blank lines are ignored.
pub fn read_log(path: &Path) -> Result<Vec<LogRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open event log {}", path.display()))?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read event log {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = LogRecord::parse_line(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), index + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Counts produced by `verify_alternation`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AlternationSummary {
    pub entries: usize,
    pub exits: usize,
    /// The log ends with an ENTER that has no matching LEAVE.
    pub open_at_end: bool,
}

/// Check that records alternate ENTER, LEAVE, ENTER, ... starting with ENTER.
pub fn verify_alternation(records: &[LogRecord]) -> Result<AlternationSummary> {
    let mut summary = AlternationSummary::default();
    let mut expected = ZoneEventKind::Enter;
    for (index, record) in records.iter().enumerate() {
        let kind = record.kind();
        if kind != expected {
            return Err(anyhow!(
                "record {} ({}) is {:?} but {:?} was expected",
                index + 1,
                record.timestamp.format(TIMESTAMP_FORMAT),
                kind,
                expected
            ));
        }
        if kind == ZoneEventKind::Enter && record.objects.as_ref().map_or(true, Vec::is_empty) {
            return Err(anyhow!(
                "record {} is an ENTER without objects",
                index + 1
            ));
        }
        expected = match kind {
            ZoneEventKind::Enter => {
                summary.entries += 1;
                ZoneEventKind::Leave
            }
            ZoneEventKind::Leave => {
                summary.exits += 1;
                ZoneEventKind::Enter
            }
        };
    }
    summary.open_at_end = summary.entries > summary.exits;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(tag: EventTag) -> LogRecord {
        LogRecord {
            event: tag,
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            objects: match tag {
                EventTag::Entered => Some(vec![LoggedObject {
                    name: "person".to_string(),
                    confidence: 0.9,
                    coords: [300, 200, 350, 250],
                }]),
                EventTag::Left => None,
            },
        }
    }

    #[test]
    fn alternating_log_verifies() {
        use EventTag::*;
        let records: Vec<_> = [Entered, Left, Entered].into_iter().map(record).collect();
        let summary = verify_alternation(&records).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.exits, 1);
        assert!(summary.open_at_end);
    }

    #[test]
    fn double_enter_is_rejected() {
        use EventTag::*;
        let records: Vec<_> = [Entered, Entered].into_iter().map(record).collect();
        assert!(verify_alternation(&records).is_err());
    }

    #[test]
    fn leading_leave_is_rejected() {
        let records = vec![record(EventTag::Left)];
        assert!(verify_alternation(&records).is_err());
    }

    #[test]
    fn read_log_reports_line_number() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log.jsonl");
        let good = record(EventTag::Entered).to_line()?;
        std::fs::write(&path, format!("{good}\n\nnot json\n"))?;
        let err = read_log(&path).unwrap_err();
        assert!(format!("{err:#}").contains(":3:"));
        Ok(())
    }
}
