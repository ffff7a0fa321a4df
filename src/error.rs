use std::path::PathBuf;

/// Failures of the event logger.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The log line could not be appended; the event is lost.
    #[error("failed to append event to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The log line was written but the snapshot image was not.
    #[error("log line written but snapshot {path} failed: {message}")]
    Snapshot { path: PathBuf, message: String },
}

impl LogError {
    /// True when the log line itself never reached the log.
    pub fn event_lost(&self) -> bool {
        !matches!(self, LogError::Snapshot { .. })
    }
}

/// Pipeline error kinds.
///
/// `Acquisition` and `SourceExhausted` end the frame loop. The others are
/// reported per frame while the loop keeps running.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("frame acquisition failed: {0:#}")]
    Acquisition(anyhow::Error),
    #[error("frame source exhausted")]
    SourceExhausted,
    #[error("detector failed: {0:#}")]
    Detection(anyhow::Error),
    #[error(transparent)]
    Log(#[from] LogError),
}

impl MonitorError {
    /// True for the error kinds that terminate the frame loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorError::Acquisition(_) | MonitorError::SourceExhausted
        )
    }
}
