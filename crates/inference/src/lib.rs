pub mod backend;
pub mod config;
pub mod logging;
pub mod postprocessing;
pub mod service;

// Re-export commonly used types for convenience
pub use backend::{ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::InferenceConfig;
pub use postprocessing::{FLAGGED_CLASS_INDEX, PostProcessor, Prediction, Verdict};
pub use service::InferenceService;
