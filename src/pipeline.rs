//! The monitor frame loop.
//!
//! One synchronous pass per frame:
//! acquire -> detect -> filter -> transition -> annotate -> (maybe) log ->
//! status -> present.
//!
//! Acquisition failure and source exhaustion end the loop. Detector, logger and
//! renderer failures are reported and counted, and the loop moves on to the
//! next frame. The camera is released exactly once on every exit path.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::config::MonitorConfig;
use crate::detect::DetectorBackend;
use crate::error::MonitorError;
use crate::eventlog::EventLogger;
use crate::frame::Frame;
use crate::ingest::{is_exhausted, CaptureGuard, FrameSource};
use crate::occupancy::{OccupancyState, OccupancyTracker, ZoneEvent, ZoneEventKind};
use crate::render::{Overlay, RenderControl, Renderer};
use crate::zone::{classify, Zone, DEFAULT_CONFIDENCE_THRESHOLD};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Cooperative stop request, checked once per frame.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request a stop on SIGINT, SIGTERM or SIGHUP.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = Arc::clone(&self.0);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")
    }
}

#[derive(Clone, Debug)]
pub struct MonitorOptions {
    pub zone: Zone,
    pub confidence_threshold: f32,
    /// Minimum time per frame; `None` runs as fast as the source allows.
    pub frame_interval: Option<Duration>,
    pub max_frames: Option<u64>,
    /// Slower detector calls are logged. Nothing is cancelled.
    pub detect_budget: Duration,
    pub health_log_interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            zone: Zone::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            frame_interval: None,
            max_frames: None,
            detect_budget: Duration::from_millis(500),
            health_log_interval: HEALTH_LOG_INTERVAL,
        }
    }
}

impl MonitorOptions {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            zone: cfg.zone,
            confidence_threshold: cfg.detector.confidence_threshold,
            frame_interval: cfg.frame_interval(),
            max_frames: None,
            detect_budget: cfg.detector.detect_budget,
            health_log_interval: HEALTH_LOG_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames: u64,
    pub detection_failures: u64,
    pub enter_events: u64,
    pub leave_events: u64,
    /// Events whose log line could not be written.
    pub lost_events: u64,
    pub snapshot_failures: u64,
    pub render_failures: u64,
}

/// Result of processing one frame.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Detections that passed the threshold with their center in the zone.
    pub qualifying: usize,
    pub event: Option<ZoneEventKind>,
    pub snapshot: Option<PathBuf>,
    /// Recoverable failure reported for this frame.
    pub error: Option<MonitorError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    StopRequested,
    FrameLimit,
    RendererQuit,
}

pub struct Monitor {
    options: MonitorOptions,
    detector: Box<dyn DetectorBackend>,
    logger: EventLogger,
    renderer: Box<dyn Renderer>,
    tracker: OccupancyTracker,
    stats: MonitorStats,
    clock: Option<fn() -> NaiveDateTime>,
}

impl Monitor {
    pub fn new(
        options: MonitorOptions,
        detector: Box<dyn DetectorBackend>,
        logger: EventLogger,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            options,
            detector,
            logger,
            renderer,
            tracker: OccupancyTracker::new(),
            stats: MonitorStats::default(),
            clock: None,
        }
    }

    /// Stamp events from `clock` instead of the frame's capture time.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn occupancy(&self) -> OccupancyState {
        self.tracker.state()
    }

    /// Run detection, zone filtering and occupancy tracking on one frame,
    /// annotate it, and log the resulting event if any.
    pub fn process_frame(&mut self, frame: &mut Frame) -> FrameOutcome {
        self.stats.frames += 1;

        let started = Instant::now();
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                self.stats.detection_failures += 1;
                let err = MonitorError::Detection(err);
                log::warn!("frame {}: {}; zone not evaluated", frame.sequence, err);
                self.renderer.annotate(
                    frame,
                    &Overlay {
                        zone: &self.options.zone,
                        detections: &[],
                        confidence_threshold: self.options.confidence_threshold,
                    },
                );
                self.renderer.status(frame, self.tracker.is_occupied());
                return FrameOutcome {
                    error: Some(err),
                    ..FrameOutcome::default()
                };
            }
        };
        let elapsed = started.elapsed();
        if elapsed > self.options.detect_budget {
            log::warn!(
                "detector {} took {:?} on frame {} (budget {:?})",
                self.detector.name(),
                elapsed,
                frame.sequence,
                self.options.detect_budget
            );
        }

        let qualifying = classify(
            &detections,
            &self.options.zone,
            self.options.confidence_threshold,
        );
        let mut outcome = FrameOutcome {
            qualifying: qualifying.len(),
            ..FrameOutcome::default()
        };
        let stamp = self.clock.map_or(frame.captured_at, |clock| clock());
        let event = self.tracker.evaluate(qualifying, stamp);

        self.renderer.annotate(
            frame,
            &Overlay {
                zone: &self.options.zone,
                detections: &detections,
                confidence_threshold: self.options.confidence_threshold,
            },
        );

        if let Some(event) = event {
            self.record(&event, frame, &mut outcome);
        }
        self.renderer.status(frame, self.tracker.is_occupied());
        outcome
    }

    fn record(&mut self, event: &ZoneEvent, frame: &Frame, outcome: &mut FrameOutcome) {
        let kind = event.kind();
        outcome.event = Some(kind);
        match kind {
            ZoneEventKind::Enter => self.stats.enter_events += 1,
            ZoneEventKind::Leave => self.stats.leave_events += 1,
        }

        match self.logger.log(event, frame) {
            Ok(receipt) => match receipt.snapshot {
                Some(path) => {
                    log::info!(
                        "[ALERT] Object entered red zone! Snapshot saved: {}",
                        path.display()
                    );
                    outcome.snapshot = Some(path);
                }
                None => log::info!("[CLEARED] Object left red zone."),
            },
            Err(err) if err.event_lost() => {
                self.stats.lost_events += 1;
                log::error!("{:?} event lost: {}", kind, err);
                outcome.error = Some(MonitorError::Log(err));
            }
            Err(err) => {
                self.stats.snapshot_failures += 1;
                log::warn!("[ALERT] Object entered red zone! {}", err);
                outcome.error = Some(MonitorError::Log(err));
            }
        }
    }

    /// Connect `source` and process frames until a stop condition.
    ///
    /// Returns `Err` only for the terminal kinds (`Acquisition`,
    /// `SourceExhausted`); the source has been released by then.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        stop: &StopSignal,
    ) -> Result<StopReason, MonitorError> {
        let mut capture = CaptureGuard::connect(source).map_err(MonitorError::Acquisition)?;
        log::info!(
            "monitoring {} with detector {} (zone {},{},{},{} threshold {:.2})",
            capture.describe(),
            self.detector.name(),
            self.options.zone.x1,
            self.options.zone.y1,
            self.options.zone.x2,
            self.options.zone.y2,
            self.options.confidence_threshold
        );

        let mut last_health_log = Instant::now();
        loop {
            if stop.is_requested() {
                log::info!("stop requested after {} frames", self.stats.frames);
                return Ok(StopReason::StopRequested);
            }
            if self
                .options
                .max_frames
                .is_some_and(|max| self.stats.frames >= max)
            {
                return Ok(StopReason::FrameLimit);
            }

            let frame_started = Instant::now();
            let mut frame = match capture.next_frame() {
                Ok(frame) => frame,
                Err(err) if is_exhausted(&err) => {
                    log::info!("{} has no more frames", capture.describe());
                    return Err(MonitorError::SourceExhausted);
                }
                Err(err) => {
                    let err = MonitorError::Acquisition(err);
                    log::error!("{}: {}", capture.describe(), err);
                    return Err(err);
                }
            };

            self.process_frame(&mut frame);

            match self.renderer.present(&frame) {
                Ok(RenderControl::Continue) => {}
                Ok(RenderControl::Stop) => {
                    log::info!("renderer requested stop");
                    return Ok(StopReason::RendererQuit);
                }
                Err(err) => {
                    self.stats.render_failures += 1;
                    log::warn!("render failed on frame {}: {:#}", frame.sequence, err);
                }
            }

            if last_health_log.elapsed() >= self.options.health_log_interval {
                let source_stats = capture.stats();
                log::info!(
                    "source {} health={} frames={} occupancy={:?} enter={} leave={} lost={}",
                    source_stats.source,
                    capture.is_healthy(),
                    source_stats.frames_captured,
                    self.tracker.state(),
                    self.stats.enter_events,
                    self.stats.leave_events,
                    self.stats.lost_events
                );
                last_health_log = Instant::now();
            }

            if let Some(interval) = self.options.frame_interval {
                let spent = frame_started.elapsed();
                if spent < interval {
                    std::thread::sleep(interval - spent);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, StubBackend};
    use crate::eventlog::SnapshotFormat;
    use crate::render::HeadlessRenderer;

    fn person(cx: i32, cy: i32) -> Detection {
        Detection::new(
            "person",
            0.9,
            BoundingBox::new(cx - 10, cy - 10, cx + 10, cy + 10).unwrap(),
        )
    }

    fn monitor(dir: &std::path::Path, detector: StubBackend) -> Monitor {
        let logger = EventLogger::new(dir.join("events.txt"), dir, SnapshotFormat::Png);
        Monitor::new(
            MonitorOptions::default(),
            Box::new(detector),
            logger,
            Box::new(HeadlessRenderer),
        )
    }

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 16 * 16 * 3], 16, 16, 1).unwrap()
    }

    #[test]
    fn detection_failure_skips_evaluation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let detector = StubBackend::new()
            .then_detect(vec![person(300, 250)])
            .then_fail("inference crashed")
            .then_idle(1);
        let mut monitor = monitor(dir.path(), detector);

        assert_eq!(
            monitor.process_frame(&mut frame()).event,
            Some(ZoneEventKind::Enter)
        );
        let failed = monitor.process_frame(&mut frame());
        assert!(matches!(failed.error, Some(MonitorError::Detection(_))));
        assert_eq!(failed.event, None);
        assert_eq!(monitor.occupancy(), OccupancyState::Occupied);

        assert_eq!(
            monitor.process_frame(&mut frame()).event,
            Some(ZoneEventKind::Leave)
        );
        assert_eq!(monitor.stats().detection_failures, 1);
        assert_eq!(monitor.stats().frames, 3);
        Ok(())
    }

    #[test]
    fn unwritable_log_counts_lost_event_and_keeps_state() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let logger = EventLogger::new(dir.path(), dir.path(), SnapshotFormat::Png);
        let mut monitor = Monitor::new(
            MonitorOptions::default(),
            Box::new(StubBackend::new().then_detect(vec![person(300, 250)])),
            logger,
            Box::new(HeadlessRenderer),
        );

        let outcome = monitor.process_frame(&mut frame());
        assert_eq!(outcome.event, Some(ZoneEventKind::Enter));
        assert!(matches!(outcome.error, Some(MonitorError::Log(_))));
        assert_eq!(monitor.stats().lost_events, 1);
        assert_eq!(monitor.occupancy(), OccupancyState::Occupied);
        Ok(())
    }

    #[test]
    fn signal_handler_installs_once_per_process() -> Result<()> {
        let signal = StopSignal::new();
        signal.install_ctrlc()?;
        assert!(!signal.is_requested());
        // A second process-wide handler is refused.
        assert!(StopSignal::new().install_ctrlc().is_err());
        Ok(())
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        assert!(!signal.is_requested());
        remote.request();
        assert!(signal.is_requested());
    }

    #[test]
    fn events_default_to_frame_capture_time() -> Result<()> {
        let captured = chrono::NaiveDate::from_ymd_opt(2023, 7, 8)
            .and_then(|d| d.and_hms_opt(9, 10, 11))
            .unwrap();
        let dir = tempfile::tempdir()?;
        let detector = StubBackend::new().then_detect(vec![person(300, 250)]);
        let mut monitor = monitor(dir.path(), detector);
        let mut frame = Frame::captured(image::RgbImage::new(16, 16), 1, captured);
        let outcome = monitor.process_frame(&mut frame);
        assert_eq!(
            outcome.snapshot,
            Some(dir.path().join("redzone_capture_091011.png"))
        );
        let records = crate::eventlog::read_log(&dir.path().join("events.txt"))?;
        assert_eq!(records[0].timestamp, captured);
        Ok(())
    }

    #[test]
    fn clock_override_stamps_events() -> Result<()> {
        fn fixed() -> NaiveDateTime {
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                .and_then(|d| d.and_hms_opt(3, 4, 5))
                .unwrap()
        }
        let dir = tempfile::tempdir()?;
        let detector = StubBackend::new().then_detect(vec![person(300, 250)]);
        let mut monitor = monitor(dir.path(), detector).with_clock(fixed);
        let outcome = monitor.process_frame(&mut frame());
        assert_eq!(
            outcome.snapshot,
            Some(dir.path().join("redzone_capture_030405.png"))
        );
        Ok(())
    }
}
