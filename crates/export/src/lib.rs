//! TorchScript export for pretrained checkpoints.
//!
//! Two pipelines share the loading and tracing code here:
//! - [`detector`]: a detection model exported at a fixed image size, with a
//!   JSON metadata sidecar describing the head.
//! - [`trace`]: any classifier-style checkpoint traced on a seeded random
//!   input and checked against its eager output.

pub mod checkpoint;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod trace;
pub mod verify;

pub use checkpoint::{Architecture, Checkpoint, CheckpointKind};
pub use config::{DetectorExportConfig, TraceExportConfig};
pub use error::ExportError;
pub use metadata::DetectorMetadata;
