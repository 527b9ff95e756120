use super::{ExecutionProvider, InferenceBackend, InferenceOutput};
use anyhow::Context;
use ndarray::{Array, ArrayD, IxDyn};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tch::{
    CModule, Device, Kind, Tensor,
    nn::{self, ModuleT},
};

/// Head size of the ImageNet checkpoints shipped for `tch::vision`.
const IMAGENET_CLASSES: i64 = 1000;

enum Classifier {
    /// TorchScript archive, e.g. the output of `trace-checkpoint`.
    Script(CModule),
    /// `tch::vision` resnet18 over a `.ot` / `.safetensors` weight file.
    Resnet18 {
        _vs: nn::VarStore,
        net: nn::FuncT<'static>,
    },
}

pub struct TchBackend {
    classifier: Classifier,
    device: Device,
}

impl TchBackend {
    /// Wrap an already loaded TorchScript module.
    pub fn from_module(mut module: CModule, device: Device) -> Self {
        module.set_eval();
        Self {
            classifier: Classifier::Script(module),
            device,
        }
    }

    fn load_resnet18(path: &str, device: Device) -> anyhow::Result<Classifier> {
        let mut vs = nn::VarStore::new(device);
        let net = tch::vision::resnet::resnet18(&vs.root(), IMAGENET_CLASSES);
        vs.load(path)
            .with_context(|| format!("Failed to load resnet18 weights from {path}"))?;
        vs.freeze();
        Ok(Classifier::Resnet18 { _vs: vs, net })
    }
}

pub fn device_for(provider: ExecutionProvider) -> Device {
    match provider {
        ExecutionProvider::Cpu => Device::Cpu,
        ExecutionProvider::Cuda => Device::cuda_if_available(),
    }
}

impl InferenceBackend for TchBackend {
    fn load_model(path: &str, provider: ExecutionProvider) -> anyhow::Result<Self> {
        let device = device_for(provider);
        tracing::info!(?device, "Initializing libtorch backend");

        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let classifier = match extension.as_deref() {
            Some("ot") | Some("safetensors") => Self::load_resnet18(path, device)?,
            _ => {
                let mut module = CModule::load_on_device(path, device)
                    .with_context(|| format!("Failed to load TorchScript model from {path}"))?;
                module.set_eval();
                Classifier::Script(module)
            }
        };

        tracing::info!("Model loaded from {}", path);
        Ok(Self { classifier, device })
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let shape: Vec<i64> = images.shape().iter().map(|&d| d as i64).collect();
        let contiguous = images.as_standard_layout();
        let data = contiguous
            .as_slice()
            .context("Input tensor is not contiguous")?;

        let input = Tensor::from_slice(data)
            .reshape(shape.as_slice())
            .to_device(self.device);

        let output = tch::no_grad(|| -> anyhow::Result<Tensor> {
            match &self.classifier {
                Classifier::Script(module) => Ok(module.forward_ts(&[&input])?),
                Classifier::Resnet18 { net, .. } => {
                    // tch::vision layers panic where libtorch rejects the input
                    panic::catch_unwind(AssertUnwindSafe(|| net.forward_t(&input, false))).map_err(
                        |payload| {
                            anyhow::anyhow!(
                                "Forward pass on input {:?} failed: {}",
                                shape,
                                common::panic_message(payload.as_ref())
                            )
                        },
                    )
                }
            }
        })?;

        let output = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous();
        let out_shape: Vec<usize> = output.size().iter().map(|&d| d as usize).collect();
        let values = Vec::<f32>::try_from(&output.flatten(0, -1))?;

        Ok(InferenceOutput {
            logits: ArrayD::from_shape_vec(IxDyn(&out_shape), values)?,
        })
    }
}
