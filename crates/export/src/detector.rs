use crate::checkpoint::{Architecture, Checkpoint, CheckpointKind, WeightsSpec};
use crate::config::DetectorExportConfig;
use crate::error::ExportError;
use crate::metadata::{DetectorMetadata, sidecar_path};
use crate::{metrics, verify};
use common::span;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tch::{Kind, Tensor};

/// Box coordinates preceding the class scores in each anchor column.
const BOX_COORDS: i64 = 4;

/// Shape of a single-stage detector output `[batch, 4 + nc, anchors]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionHead {
    pub num_classes: usize,
    pub anchors: usize,
}

impl DetectionHead {
    pub fn from_shape(shape: &[i64], batch: i64) -> Result<Self, ExportError> {
        let [b, channels, anchors] = shape else {
            return Err(ExportError::NotADetector(format!(
                "expected output [batch, 4 + classes, anchors], got {:?}",
                shape
            )));
        };

        if *b != batch {
            return Err(ExportError::NotADetector(format!(
                "output batch {} does not match input batch {}",
                b, batch
            )));
        }

        if *channels <= BOX_COORDS || *anchors < 1 {
            return Err(ExportError::NotADetector(format!(
                "output {:?} has no room for boxes plus at least one class",
                shape
            )));
        }

        Ok(Self {
            num_classes: (*channels - BOX_COORDS) as usize,
            anchors: *anchors as usize,
        })
    }
}

#[derive(Debug)]
pub struct DetectorReport {
    pub output_path: PathBuf,
    pub metadata_path: PathBuf,
    pub bytes: u64,
    pub head: DetectionHead,
}

/// Load a detection checkpoint. Only TorchScript archives qualify: a bare
/// weights file has no detection head to rebuild.
pub fn load(config: &DetectorExportConfig) -> Result<Checkpoint, ExportError> {
    let path = &config.model_path;
    if path.is_file() && CheckpointKind::from_path(path)? == CheckpointKind::Weights {
        return Err(ExportError::UnsupportedCheckpoint {
            path: path.clone(),
            reason: "detection models must be TorchScript archives".to_string(),
        });
    }

    // Never consulted for TorchScript archives
    let unused = WeightsSpec {
        architecture: Architecture::Resnet18,
        num_classes: 1,
    };
    Checkpoint::load(path, unused, config.device)
}

/// Trace `checkpoint` at the configured image size, save it and write the
/// metadata sidecar. Existing files are overwritten.
#[tracing::instrument(skip_all, fields(output = %config.output_path.display(), imgsz = config.imgsz))]
pub fn export(
    checkpoint: &Checkpoint,
    config: &DetectorExportConfig,
) -> Result<DetectorReport, ExportError> {
    let start = Instant::now();
    let _guard = tch::no_grad_guard();

    let example = Tensor::zeros(
        [config.batch, 3, config.imgsz, config.imgsz],
        (Kind::Float, checkpoint.device),
    );

    let eager = {
        let _s = span!("warmup");
        checkpoint.forward(&example)?
    };
    let head = DetectionHead::from_shape(&eager.size(), config.batch)?;
    tracing::info!(
        num_classes = head.num_classes,
        anchors = head.anchors,
        "Detection head recognized"
    );

    let traced = checkpoint.trace(&example)?;

    if let Some(parent) = config.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    traced.save(&config.output_path)?;

    // The saved graph must still produce the same head
    let reloaded = verify::run_saved(&config.output_path, checkpoint.device, &example)?;
    if reloaded.size() != eager.size() {
        return Err(ExportError::ShapeMismatch {
            expected: eager.size(),
            actual: reloaded.size(),
        });
    }

    let metadata_path = sidecar_path(&config.output_path);
    DetectorMetadata::new(config, &head).write(&metadata_path)?;

    let bytes = fs::metadata(&config.output_path)?.len();
    metrics::record_export("detector", start.elapsed());

    tracing::info!(
        bytes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Detector exported"
    );

    Ok(DetectorReport {
        output_path: config.output_path.clone(),
        metadata_path,
        bytes,
        head,
    })
}
