use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),

    #[error("Checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("Unsupported checkpoint {}: {reason}", path.display())]
    UnsupportedCheckpoint { path: PathBuf, reason: String },

    #[error("Unknown architecture '{0}'")]
    UnknownArchitecture(String),

    #[error("Tracing failed: {0}")]
    Trace(String),

    #[error("Not a detection model: {0}")]
    NotADetector(String),

    #[error(
        "Traced output differs from eager output (max abs diff {max_abs_diff:.3e} > tolerance {tolerance:.3e})"
    )]
    VerificationFailed { max_abs_diff: f64, tolerance: f64 },

    #[error("Output shape changed after export: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<i64>, actual: Vec<i64> },

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
