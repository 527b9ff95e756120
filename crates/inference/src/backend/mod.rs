use ndarray::{Array, IxDyn};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[cfg(feature = "tch-backend")]
pub mod tch;

/// Where the forward pass runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            other => anyhow::bail!("Unknown execution provider '{other}' (expected 'cpu' or 'cuda')"),
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::Cpu => f.write_str("cpu"),
            ExecutionProvider::Cuda => f.write_str("cuda"),
        }
    }
}

pub trait InferenceBackend {
    fn load_model(path: &str, provider: ExecutionProvider) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run one forward pass in inference mode on a `[1, 3, H, W]` batch.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;
}

pub struct InferenceOutput {
    pub logits: ndarray::ArrayD<f32>, // [1, num_classes] raw class scores
}
