//! Red-zone intrusion monitor.
//!
//! Runs an object detector over a camera feed and watches one rectangle of the
//! frame, the red zone. A detection counts when its confidence meets the
//! threshold and the center of its box lies inside the zone (edges included).
//!
//! # Pipeline
//!
//! Each frame flows through one synchronous pass:
//!
//! 1. **Acquisition** (`ingest`): a `FrameSource` yields the next frame.
//! 2. **Detection** (`detect`): a `DetectorBackend` returns labelled boxes.
//! 3. **Zone filter** (`zone`): keeps the confident detections centered in the zone.
//! 4. **Occupancy** (`occupancy`): a two-state tracker emits ENTER on the
//!    empty-to-occupied edge and LEAVE on the way back, never repeatedly.
//! 5. **Event log** (`eventlog`): appends one JSON line per event and saves a
//!    snapshot for each ENTER.
//!
//! `pipeline::Monitor` drives the loop; rendering sits behind the `Renderer`
//! trait so the core has no display dependency.

pub mod config;
pub mod detect;
pub mod error;
pub mod eventlog;
pub mod frame;
pub mod ingest;
pub mod occupancy;
pub mod pipeline;
pub mod render;
pub mod zone;

pub use config::{CameraSettings, DetectorSettings, MonitorConfig, OutputSettings};
pub use detect::{BackendRegistry, BoundingBox, Detection, DetectorBackend};
pub use error::{LogError, MonitorError};
pub use eventlog::{read_log, verify_alternation, EventLogger, LogRecord, SnapshotFormat};
pub use frame::Frame;
pub use ingest::{open_source, CaptureGuard, FrameSource, SourceExhausted, SourceStats};
pub use occupancy::{OccupancyState, OccupancyTracker, ZoneEvent, ZoneEventKind};
pub use pipeline::{Monitor, MonitorOptions, MonitorStats, StopReason, StopSignal};
pub use render::{HeadlessRenderer, Overlay, OverlayRenderer, RenderControl, Renderer};
pub use zone::{classify, Zone, DEFAULT_CONFIDENCE_THRESHOLD};
