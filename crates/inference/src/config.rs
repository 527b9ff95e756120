use crate::backend::ExecutionProvider;
use crate::postprocessing::FLAGGED_CLASS_INDEX;
use anyhow::Context;
use preprocess::{DEFAULT_INPUT_SIZE, Normalization};
use std::env;

pub use common::Environment;

#[cfg(feature = "tch-backend")]
const DEFAULT_MODEL_PATH: &str = "models/resnet18.ot";

#[cfg(not(feature = "tch-backend"))]
const DEFAULT_MODEL_PATH: &str = "models/resnet18.onnx";

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub model_path: String,
    pub execution_provider: ExecutionProvider,
    pub input_size: (u32, u32),
    pub normalization: Normalization,
    pub flagged_class: usize,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();
        let otel_endpoint = common::otel_endpoint_from_env();

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());

        let execution_provider = match env::var("EXECUTION_PROVIDER") {
            Ok(s) => s.parse()?,
            Err(_) => ExecutionProvider::Cpu,
        };

        let input_width = positive_dimension("INPUT_WIDTH", DEFAULT_INPUT_SIZE.0)?;
        let input_height = positive_dimension("INPUT_HEIGHT", DEFAULT_INPUT_SIZE.1)?;

        let normalization = match env::var("NORMALIZATION") {
            Ok(s) => s.parse()?,
            Err(_) => Normalization::None,
        };

        let flagged_class = match env::var("FLAGGED_CLASS") {
            Ok(s) => s.trim().parse::<usize>().with_context(|| {
                format!("FLAGGED_CLASS must be a non-negative class index, got '{s}'")
            })?,
            Err(_) => FLAGGED_CLASS_INDEX,
        };

        Ok(Self {
            environment,
            otel_endpoint,
            model_path,
            execution_provider,
            input_size: (input_width, input_height),
            normalization,
            flagged_class,
        })
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            otel_endpoint: None,
            model_path: "/models/resnet18.onnx".to_string(),
            execution_provider: ExecutionProvider::Cpu,
            input_size: DEFAULT_INPUT_SIZE,
            normalization: Normalization::None,
            flagged_class: FLAGGED_CLASS_INDEX,
        }
    }
}

/// A set variable must hold a positive pixel count; unset means `default`.
fn positive_dimension(var: &str, default: u32) -> anyhow::Result<u32> {
    match env::var(var) {
        Ok(s) => s
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&v| v > 0)
            .with_context(|| format!("{var} must be a positive integer, got '{s}'")),
        Err(_) => Ok(default),
    }
}
