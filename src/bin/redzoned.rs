//! redzoned - red-zone monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (defaults, config file, REDZONE_* env, then flags)
//! 2. Builds the configured detector backend and opens the camera
//! 3. Runs the frame loop until Ctrl-C, the frame limit, or the end of the source
//! 4. Appends ENTER/LEAVE events to the JSONL log with a snapshot per ENTER

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use redzone_monitor::{
    open_source, BackendRegistry, EventLogger, HeadlessRenderer, Monitor, MonitorConfig,
    MonitorError, MonitorOptions, MonitorStats, OverlayRenderer, Renderer, SnapshotFormat,
    StopSignal, Zone,
};

const PREVIEW_EVERY: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "redzoned", about = "Watch a camera feed for objects entering the red zone")]
struct Args {
    /// JSON or TOML config file
    #[arg(long, env = "REDZONE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera source: stub://name, /dev/videoN, a camera index, or an image directory
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Detector backend name
    #[arg(long)]
    backend: Option<String>,

    /// Model file for model-based backends
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Minimum detection confidence (0..=1)
    #[arg(long)]
    threshold: Option<f32>,

    /// Red zone as x1,y1,x2,y2
    #[arg(long, value_name = "X1,Y1,X2,Y2")]
    zone: Option<String>,

    /// Event log path
    #[arg(long, value_name = "PATH")]
    log_path: Option<PathBuf>,

    /// Directory for ENTER snapshots
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,

    /// Snapshot image format (jpg|png)
    #[arg(long, value_name = "FORMAT")]
    snapshot_format: Option<String>,

    /// Target frame rate, 0 for unpaced
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Periodically write the annotated frame here
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,

    /// TrueType font for box captions
    #[arg(long, value_name = "PATH")]
    label_font: Option<PathBuf>,

    /// Skip drawing the overlay (snapshots show the raw frame)
    #[arg(long)]
    no_overlay: bool,

    /// List available detector backends and exit
    #[arg(long)]
    list_backends: bool,
}

impl Args {
    fn apply(&self, cfg: &mut MonitorConfig) -> Result<()> {
        if let Some(source) = &self.source {
            cfg.camera.source = source.clone();
        }
        if let Some(backend) = &self.backend {
            cfg.detector.backend = backend.clone();
        }
        if let Some(model) = &self.model {
            cfg.detector.model_path = model.clone();
        }
        if let Some(threshold) = self.threshold {
            cfg.detector.confidence_threshold = threshold;
        }
        if let Some(zone) = &self.zone {
            cfg.zone = Zone::parse(zone)?;
        }
        if let Some(path) = &self.log_path {
            cfg.output.log_path = path.clone();
        }
        if let Some(dir) = &self.snapshot_dir {
            cfg.output.snapshot_dir = dir.clone();
        }
        if let Some(format) = &self.snapshot_format {
            cfg.output.snapshot_format = SnapshotFormat::parse(format)?;
        }
        if let Some(fps) = self.fps {
            cfg.camera.target_fps = fps;
        }
        if let Some(preview) = &self.preview {
            cfg.output.preview_path = Some(preview.clone());
        }
        if let Some(font) = &self.label_font {
            cfg.output.label_font = Some(font.clone());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let registry = BackendRegistry::with_builtin();
    if args.list_backends {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut cfg = match &args.config {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load()?,
    };
    args.apply(&mut cfg)?;
    cfg.validate()?;

    let mut detector = registry.build(&cfg.detector.backend, &cfg.detector)?;
    detector
        .warm_up()
        .with_context(|| format!("warm up detector {}", detector.name()))?;

    let logger = EventLogger::new(
        cfg.output.log_path.clone(),
        cfg.output.snapshot_dir.clone(),
        cfg.output.snapshot_format,
    );
    logger.prepare()?;
    log::info!(
        "redzoned running. writing to {}, snapshots in {}",
        logger.log_path().display(),
        logger.snapshot_dir().display()
    );

    let renderer: Box<dyn Renderer> = if args.no_overlay {
        Box::new(HeadlessRenderer)
    } else {
        let mut overlay = OverlayRenderer::new();
        if let Some(path) = &cfg.output.preview_path {
            overlay = overlay.with_preview(path.clone(), PREVIEW_EVERY);
        }
        if let Some(font) = &cfg.output.label_font {
            overlay = overlay.with_label_font(font)?;
        }
        Box::new(overlay)
    };

    let mut options = MonitorOptions::from_config(&cfg);
    options.max_frames = args.max_frames;

    let mut source = open_source(&cfg.camera)?;
    let stop = StopSignal::new();
    stop.install_ctrlc()?;

    let mut monitor = Monitor::new(options, detector, logger, renderer);
    let result = monitor.run(source.as_mut(), &stop);
    print_summary(monitor.stats());

    match result {
        Ok(reason) => {
            log::info!("redzoned stopped: {:?}", reason);
            Ok(())
        }
        Err(MonitorError::SourceExhausted) => {
            log::info!("redzoned stopped: source exhausted");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_summary(stats: &MonitorStats) {
    println!("frames processed:   {}", stats.frames);
    println!("zone entries:       {}", stats.enter_events);
    println!("zone exits:         {}", stats.leave_events);
    println!("detector failures:  {}", stats.detection_failures);
    println!("lost events:        {}", stats.lost_events);
    println!("snapshot failures:  {}", stats.snapshot_failures);
    println!("render failures:    {}", stats.render_failures);
}
