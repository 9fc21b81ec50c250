use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SETTLE_MS: u64 = 2_000;
const DEFAULT_CAMERA: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_MODEL_PATH: &str = "litdet.onnx";
const DEFAULT_LABELS_PATH: &str = "labelmap.txt";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_PROXIMITY_CM: f32 = 15.0;
const DEFAULT_DWELL_MS: u64 = 3_000;

#[derive(Debug, Deserialize, Default)]
struct LitterdConfigFile {
    serial: Option<SerialConfigFile>,
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    control: Option<ControlConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    port: Option<String>,
    baud_rate: Option<u32>,
    timeout_ms: Option<u64>,
    settle_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    labels: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    float_input: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    proximity_cm: Option<f32>,
    dwell_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LitterdConfig {
    pub serial: SerialSettings,
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub control: ControlSettings,
}

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    pub settle: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Model file, or `stub://...` for the scripted backend.
    pub path: PathBuf,
    /// Label map; when the file is absent detections stay unnamed.
    pub labels: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub float_input: bool,
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub proximity_cm: f32,
    pub dwell: Duration,
}

impl LitterdConfig {
    /// Load from `LITTER_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LITTER_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LitterdConfigFile) -> Self {
        let serial = file.serial.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let control = file.control.unwrap_or_default();

        Self {
            serial: SerialSettings {
                port: serial
                    .port
                    .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
                baud_rate: serial.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
                timeout: Duration::from_millis(
                    serial.timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
                ),
                settle: Duration::from_millis(serial.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
            },
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            model: ModelSettings {
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels: model
                    .labels
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
                input_width: model.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: model.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                float_input: model.float_input.unwrap_or(false),
            },
            control: ControlSettings {
                proximity_cm: control.proximity_cm.unwrap_or(DEFAULT_PROXIMITY_CM),
                dwell: Duration::from_millis(control.dwell_ms.unwrap_or(DEFAULT_DWELL_MS)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(port) = non_empty_env("LITTER_SERIAL_PORT") {
            self.serial.port = port;
        }
        if let Some(baud) = non_empty_env("LITTER_BAUD_RATE") {
            self.serial.baud_rate = baud
                .parse()
                .map_err(|_| anyhow!("LITTER_BAUD_RATE must be an integer"))?;
        }
        if let Some(camera) = non_empty_env("LITTER_CAMERA") {
            self.camera.device = camera;
        }
        if let Some(model) = non_empty_env("LITTER_MODEL_PATH") {
            self.model.path = PathBuf::from(model);
        }
        if let Some(labels) = non_empty_env("LITTER_LABELS_PATH") {
            self.model.labels = PathBuf::from(labels);
        }
        if let Some(proximity) = non_empty_env("LITTER_PROXIMITY_CM") {
            self.control.proximity_cm = proximity
                .parse()
                .map_err(|_| anyhow!("LITTER_PROXIMITY_CM must be a number of centimeters"))?;
        }
        if let Some(dwell) = non_empty_env("LITTER_DWELL_MS") {
            let millis: u64 = dwell
                .parse()
                .map_err(|_| anyhow!("LITTER_DWELL_MS must be an integer number of milliseconds"))?;
            self.control.dwell = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(anyhow!("serial port must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(anyhow!("baud rate must be greater than zero"));
        }
        if self.serial.timeout.is_zero() {
            return Err(anyhow!("serial read timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input dimensions must be non-zero"));
        }
        if !self.control.proximity_cm.is_finite() || self.control.proximity_cm <= 0.0 {
            return Err(anyhow!("proximity threshold must be a positive distance"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<LitterdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
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

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
