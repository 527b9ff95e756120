use crate::checkpoint::Checkpoint;
use crate::config::TraceExportConfig;
use crate::error::ExportError;
use crate::{metrics, verify};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tch::{Kind, Tensor};

#[derive(Debug)]
pub struct TraceReport {
    pub output_path: PathBuf,
    pub input_shape: Vec<i64>,
    pub output_shape: Vec<i64>,
    pub bytes: u64,
    /// `None` when verification was disabled.
    pub max_abs_diff: Option<f64>,
}

pub fn load(config: &TraceExportConfig) -> Result<Checkpoint, ExportError> {
    Checkpoint::load(&config.model_path, config.weights, config.device)
}

/// The seeded random input the checkpoint is traced with.
pub fn example_input(config: &TraceExportConfig, checkpoint: &Checkpoint) -> Tensor {
    tch::manual_seed(config.seed);
    Tensor::randn(config.input_shape.as_slice(), (Kind::Float, checkpoint.device))
}

/// Trace `checkpoint` on a synthetic input, save it and optionally check the
/// saved graph against the eager model. Existing files are overwritten.
#[tracing::instrument(skip_all, fields(output = %config.output_path.display()))]
pub fn export(
    checkpoint: &Checkpoint,
    config: &TraceExportConfig,
) -> Result<TraceReport, ExportError> {
    let start = Instant::now();
    let _guard = tch::no_grad_guard();

    let example = example_input(config, checkpoint);
    tracing::debug!(shape = ?example.size(), seed = config.seed, "Example input ready");

    let eager = checkpoint.forward(&example).map_err(|e| match e {
        ExportError::Torch(inner) => ExportError::Trace(inner.to_string()),
        other => other,
    })?;

    let traced = checkpoint.trace(&example)?;

    if let Some(parent) = config.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    traced.save(&config.output_path)?;

    let max_abs_diff = if config.verify {
        Some(verify::verify_saved(
            &config.output_path,
            checkpoint.device,
            &example,
            &eager,
            config.tolerance,
        )?)
    } else {
        tracing::warn!("Verification disabled, traced output not compared");
        None
    };

    let bytes = fs::metadata(&config.output_path)?.len();
    metrics::record_export("trace", start.elapsed());

    tracing::info!(
        bytes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Checkpoint traced"
    );

    Ok(TraceReport {
        output_path: config.output_path.clone(),
        input_shape: config.input_shape.clone(),
        output_shape: eager.size(),
        bytes,
        max_abs_diff,
    })
}
