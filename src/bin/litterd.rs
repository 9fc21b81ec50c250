//! litterd - litter picker controller daemon
//!
//! This daemon:
//! 1. Opens the serial link to the actuator microcontroller (and waits for it to settle)
//! 2. Loads the detection model and label map
//! 3. Captures frames from the configured camera
//! 4. Runs the detection-to-actuation loop until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use litter_picker::config::LitterdConfig;
use litter_picker::detect::InputType;
use litter_picker::{
    ActuatorProtocol, CameraConfig, CameraSource, ControlLoop, DetectionEngine, FixedDwell,
    InputSpec, LabelMap, LoopStats, ScriptedLink, SerialTransport, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect litter and drive the pick actuator")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "LITTER_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many camera cycles.
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Do not open the serial port; log commands against an in-memory link.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = LitterdConfig::load_from(args.config.as_deref())?;
    log::info!(
        "litterd {} starting: serial={} camera={} model={}",
        env!("CARGO_PKG_VERSION"),
        cfg.serial.port,
        cfg.camera.device,
        cfg.model.path.display()
    );

    let stats = if args.dry_run {
        log::warn!("dry run: serial port {} not opened", cfg.serial.port);
        run(&cfg, ScriptedLink::new(), args.max_cycles)?
    } else {
        run(&cfg, open_serial(&cfg)?, args.max_cycles)?
    };

    log::info!(
        "litterd stopped after {} cycles: {} triggered, {} picks, {} recovered link errors",
        stats.cycles,
        stats.triggered,
        stats.picks,
        stats.recovered_errors
    );
    Ok(())
}

#[cfg(feature = "serial")]
fn open_serial(cfg: &LitterdConfig) -> Result<litter_picker::SerialPortTransport> {
    let serial = litter_picker::SerialConfig {
        port: cfg.serial.port.clone(),
        baud_rate: cfg.serial.baud_rate,
        timeout: cfg.serial.timeout,
        settle: cfg.serial.settle,
    };
    Ok(litter_picker::SerialPortTransport::open(&serial)?)
}

#[cfg(not(feature = "serial"))]
fn open_serial(_cfg: &LitterdConfig) -> Result<ScriptedLink> {
    Err(anyhow::anyhow!(
        "serial support not compiled in (enable the serial feature or use --dry-run)"
    ))
}

fn run<T: SerialTransport>(
    cfg: &LitterdConfig,
    transport: T,
    max_cycles: Option<u64>,
) -> Result<LoopStats> {
    let mut engine = build_engine(cfg)?;
    engine.warm_up().context("warm up detection backend")?;

    let mut camera = CameraSource::new(CameraConfig {
        device: cfg.camera.device.clone(),
        target_fps: cfg.camera.target_fps,
        width: cfg.camera.width,
        height: cfg.camera.height,
    })?;
    camera.connect()?;

    let actuator = ActuatorProtocol::new(transport, cfg.serial.timeout);
    let mut control = ControlLoop::new(
        camera,
        engine,
        actuator,
        FixedDwell::new(cfg.control.dwell),
    )
    .with_proximity_cm(cfg.control.proximity_cm);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    log::info!(
        "control loop running (proximity {} cm, dwell {:?}); Ctrl-C to stop",
        cfg.control.proximity_cm,
        cfg.control.dwell
    );
    let stats = control.run(&stop, max_cycles)?;
    if stop.load(Ordering::SeqCst) {
        log::warn!("stop signal received");
    }

    let camera = control.source();
    let camera_stats = camera.stats();
    log::info!(
        "camera {}: {} frames captured, healthy={}",
        camera_stats.device,
        camera_stats.frames_captured,
        camera.is_healthy()
    );
    Ok(stats)
}

fn build_engine(cfg: &LitterdConfig) -> Result<DetectionEngine> {
    let dtype = if cfg.model.float_input {
        InputType::F32
    } else {
        InputType::U8
    };
    let spec = InputSpec::new(cfg.model.input_width, cfg.model.input_height, dtype);

    let model_path = cfg.model.path.to_string_lossy();
    let engine = if model_path.starts_with("stub://") {
        log::warn!("using stub detection backend ({})", model_path);
        DetectionEngine::new(StubBackend::new(spec))
    } else {
        tract_engine(cfg, spec)?
    };

    let labels_path = &cfg.model.labels;
    if labels_path.exists() {
        let labels = LabelMap::load(labels_path)?;
        log::info!(
            "loaded {} labels from {}",
            labels.len(),
            labels_path.display()
        );
        Ok(engine.with_labels(labels))
    } else {
        log::warn!(
            "label file {} not found; detections will be unnamed",
            labels_path.display()
        );
        Ok(engine)
    }
}

#[cfg(feature = "backend-tract")]
fn tract_engine(cfg: &LitterdConfig, spec: InputSpec) -> Result<DetectionEngine> {
    let backend = litter_picker::detect::TractBackend::new(&cfg.model.path, spec)?;
    Ok(DetectionEngine::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_engine(cfg: &LitterdConfig, _spec: InputSpec) -> Result<DetectionEngine> {
    Err(anyhow::anyhow!(
        "model {} requires the backend-tract feature",
        cfg.model.path.display()
    ))
}
