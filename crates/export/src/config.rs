use crate::checkpoint::{Architecture, WeightsSpec};
use anyhow::Context;
use std::env;
use std::path::PathBuf;
use tch::Device;

pub use common::Environment;

pub const DEFAULT_DETECTOR_PATH: &str = "models/320n.pt";
pub const DEFAULT_DETECTOR_OUTPUT: &str = "models/320n_ts.pt";
pub const DEFAULT_TRACE_OUTPUT: &str = "models/320n_torchscript.pt";

/// Synthetic input for generic checkpoints: one RGB image at the usual CNN size.
pub const DEFAULT_INPUT_SHAPE: [i64; 4] = [1, 3, 224, 224];
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Settings for `export-detector`.
#[derive(Debug, Clone)]
pub struct DetectorExportConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub model_path: PathBuf,
    pub output_path: PathBuf,
    pub device: Device,
    pub imgsz: i64,
    pub batch: i64,
    pub stride: i64,
    pub class_names: Option<Vec<String>>,
}

impl DetectorExportConfig {
    pub fn with_paths(model_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            environment: Environment::Development,
            otel_endpoint: None,
            model_path: model_path.into(),
            output_path: output_path.into(),
            device: Device::Cpu,
            imgsz: 320,
            batch: 1,
            stride: 32,
            class_names: None,
        }
    }

    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::with_paths(
            env::var("MODEL_PATH").unwrap_or_else(|_| DEFAULT_DETECTOR_PATH.to_string()),
            env::var("OUTPUT_PATH").unwrap_or_else(|_| DEFAULT_DETECTOR_OUTPUT.to_string()),
        );

        config.environment = Environment::from_env();
        config.otel_endpoint = common::otel_endpoint_from_env();
        config.device = device_from_env()?;

        config.imgsz = env::var("IMGSZ")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(config.imgsz);

        config.batch = env::var("BATCH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(config.batch);

        config.stride = env::var("STRIDE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(config.stride);

        config.class_names = env::var("CLASS_NAMES").ok().map(|s| parse_names(&s));

        Ok(config)
    }
}

/// Settings for `trace-checkpoint`.
#[derive(Debug, Clone)]
pub struct TraceExportConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub model_path: PathBuf,
    pub output_path: PathBuf,
    pub device: Device,
    pub weights: WeightsSpec,
    pub input_shape: Vec<i64>,
    pub seed: i64,
    pub verify: bool,
    pub tolerance: f64,
}

impl TraceExportConfig {
    pub fn with_paths(model_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            environment: Environment::Development,
            otel_endpoint: None,
            model_path: model_path.into(),
            output_path: output_path.into(),
            device: Device::Cpu,
            weights: WeightsSpec {
                architecture: Architecture::Resnet18,
                num_classes: 1000,
            },
            input_shape: DEFAULT_INPUT_SHAPE.to_vec(),
            seed: 0,
            verify: true,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::with_paths(
            env::var("MODEL_PATH").unwrap_or_else(|_| DEFAULT_DETECTOR_PATH.to_string()),
            env::var("OUTPUT_PATH").unwrap_or_else(|_| DEFAULT_TRACE_OUTPUT.to_string()),
        );

        config.environment = Environment::from_env();
        config.otel_endpoint = common::otel_endpoint_from_env();
        config.device = device_from_env()?;

        if let Ok(s) = env::var("ARCHITECTURE") {
            config.weights.architecture = s.parse()?;
        }

        if let Ok(s) = env::var("NUM_CLASSES") {
            config.weights.num_classes = s
                .trim()
                .parse()
                .ok()
                .filter(|&n: &i64| n > 0)
                .with_context(|| format!("NUM_CLASSES must be a positive integer, got '{s}'"))?;
        }

        if let Ok(s) = env::var("INPUT_SHAPE") {
            config.input_shape = parse_shape(&s)?;
        }

        config.seed = env::var("SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.seed);

        config.verify = env::var("VERIFY")
            .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        config.tolerance = env::var("VERIFY_TOLERANCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&t: &f64| t >= 0.0)
            .unwrap_or(config.tolerance);

        Ok(config)
    }
}

/// `cpu`, `cuda` (first GPU if present, else CPU) or `cuda:N`.
pub fn parse_device(s: &str) -> anyhow::Result<Device> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => Ok(Device::cuda_if_available()),
        _ => {
            let index = s
                .strip_prefix("cuda:")
                .and_then(|i| i.parse::<usize>().ok())
                .with_context(|| format!("Unknown device '{s}' (expected cpu, cuda or cuda:N)"))?;
            Ok(Device::Cuda(index))
        }
    }
}

fn device_from_env() -> anyhow::Result<Device> {
    match env::var("DEVICE") {
        Ok(s) => parse_device(&s),
        Err(_) => Ok(Device::Cpu),
    }
}

/// Comma separated positive dimensions, e.g. `1,3,224,224`.
pub fn parse_shape(s: &str) -> anyhow::Result<Vec<i64>> {
    let dims = s
        .split(',')
        .map(|d| d.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid input shape '{s}'"))?;

    if dims.is_empty() || dims.iter().any(|&d| d <= 0) {
        anyhow::bail!("Invalid input shape '{s}': dimensions must be positive");
    }

    Ok(dims)
}

fn parse_names(s: &str) -> Vec<String> {
    s.split(',')
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}
