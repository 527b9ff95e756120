use super::{ExecutionProvider, InferenceBackend, InferenceOutput};
use anyhow::Context;
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

pub struct OrtBackend {
    session: Session,
}

impl OrtBackend {
    /// Build a session for the classifier at `path` on `provider`.
    pub fn load_model_with_provider(
        path: &str,
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        // Repeated calls keep the first environment
        let _ = ort::init().commit();

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        let mut builder = match provider {
            ExecutionProvider::Cuda => builder.with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()
                    .error_on_failure(),
            ])?,
            ExecutionProvider::Cpu => builder,
        };
        tracing::info!(%provider, "Initializing ONNX Runtime session");

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load ONNX model from {path} on {provider}"))?;

        tracing::info!("Model loaded from {}", path);
        Ok(Self { session })
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str, provider: ExecutionProvider) -> anyhow::Result<Self> {
        Self::load_model_with_provider(path, provider)
    }

    /// Feeds the first graph input and reads the first graph output.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(images.view())?])?;

        let logits = outputs[0].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            logits: logits.into_owned(),
        })
    }
}
