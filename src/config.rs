use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::eventlog::SnapshotFormat;
use crate::zone::{Zone, DEFAULT_CONFIDENCE_THRESHOLD};

const DEFAULT_BACKEND: &str = "cpu";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_DETECT_BUDGET_MS: u64 = 500;
const DEFAULT_SOURCE: &str = "stub://webcam";
const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_LOG_PATH: &str = "yolo_redzone_log.txt";
const DEFAULT_SNAPSHOT_DIR: &str = ".";

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    detector: Option<DetectorConfigFile>,
    zone: Option<Zone>,
    camera: Option<CameraConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
    detect_budget_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    log_path: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    snapshot_format: Option<SnapshotFormat>,
    preview_path: Option<PathBuf>,
    label_font: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pub detector: DetectorSettings,
    pub zone: Zone,
    pub camera: CameraSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// Detector latency above this is logged as a warning.
    pub detect_budget: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            detect_budget: Duration::from_millis(DEFAULT_DETECT_BUDGET_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://name`, `/dev/videoN`, a bare camera index, or an image directory.
    pub source: String,
    /// 0 disables pacing.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            target_fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub log_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub snapshot_format: SnapshotFormat,
    /// Periodically refreshed annotated preview image.
    pub preview_path: Option<PathBuf>,
    /// Font for box captions; boxes are drawn without text when unset.
    pub label_font: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            snapshot_format: SnapshotFormat::default(),
            preview_path: None,
            label_font: None,
        }
    }
}

impl MonitorConfig {
    /// Defaults, then `REDZONE_CONFIG` (JSON or `.toml`), then `REDZONE_*` env.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REDZONE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file and apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let defaults = Self::default();
        let detector = file.detector.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        Self {
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.detector.backend),
                model_path: detector.model_path.unwrap_or(defaults.detector.model_path),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(defaults.detector.confidence_threshold),
                iou_threshold: detector
                    .iou_threshold
                    .unwrap_or(defaults.detector.iou_threshold),
                input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
                detect_budget: detector
                    .detect_budget_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.detector.detect_budget),
            },
            zone: file.zone.unwrap_or(defaults.zone),
            camera: CameraSettings {
                source: camera.source.unwrap_or(defaults.camera.source),
                target_fps: camera.target_fps.unwrap_or(defaults.camera.target_fps),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
            },
            output: OutputSettings {
                log_path: output.log_path.unwrap_or(defaults.output.log_path),
                snapshot_dir: output.snapshot_dir.unwrap_or(defaults.output.snapshot_dir),
                snapshot_format: output
                    .snapshot_format
                    .unwrap_or(defaults.output.snapshot_format),
                preview_path: output.preview_path,
                label_font: output.label_font,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_value("REDZONE_SOURCE") {
            self.camera.source = source;
        }
        if let Some(backend) = env_value("REDZONE_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = env_value("REDZONE_MODEL") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(threshold) = env_value("REDZONE_THRESHOLD") {
            self.detector.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("REDZONE_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Some(zone) = env_value("REDZONE_ZONE") {
            self.zone = Zone::parse(&zone)?;
        }
        if let Some(path) = env_value("REDZONE_LOG_PATH") {
            self.output.log_path = PathBuf::from(path);
        }
        if let Some(dir) = env_value("REDZONE_SNAPSHOT_DIR") {
            self.output.snapshot_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.detector.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within 0..=1 (got {})",
                threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!("iou_threshold must be within 0..=1"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("input_size must be greater than zero"));
        }
        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector backend must not be empty"));
        }
        self.zone.validate()?;
        if self.camera.source.trim().is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.output.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log_path must not be empty"));
        }
        Ok(())
    }

    /// Pause between frames, if pacing is enabled.
    pub fn frame_interval(&self) -> Option<Duration> {
        match self.camera.target_fps {
            0 => None,
            fps => Some(Duration::from_secs_f64(1.0 / fps as f64)),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_monitor() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.detector.confidence_threshold, 0.6);
        assert_eq!(cfg.zone, Zone::new(200, 150, 450, 350).unwrap());
        assert_eq!(cfg.output.log_path, PathBuf::from("yolo_redzone_log.txt"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let file: MonitorConfigFile =
            serde_json::from_str(r#"{"detector": {"confidence_threshold": 0.75}}"#).unwrap();
        let cfg = MonitorConfig::from_file(file);
        assert_eq!(cfg.detector.confidence_threshold, 0.75);
        assert_eq!(cfg.detector.backend, "cpu");
        assert_eq!(cfg.camera.source, "stub://webcam");
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = MonitorConfig::default();
        cfg.detector.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_zone() {
        let cfg = MonitorConfig {
            zone: Zone {
                x1: 450,
                y1: 150,
                x2: 200,
                y2: 350,
            },
            ..MonitorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn frame_interval_follows_fps() {
        let mut cfg = MonitorConfig::default();
        assert_eq!(cfg.frame_interval(), Some(Duration::from_millis(100)));
        cfg.camera.target_fps = 0;
        assert_eq!(cfg.frame_interval(), None);
    }
}
