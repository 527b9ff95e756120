use crate::error::ExportError;
use common::{panic_message, span};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tch::{
    CModule, Device, IValue, Tensor,
    nn::{self, ModuleT},
};

/// Storage format of a checkpoint, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    /// TorchScript archive: architecture and weights in one file.
    Script,
    /// Bare parameters; needs an [`Architecture`] to be rebuilt.
    Weights,
}

impl CheckpointKind {
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("pt" | "pth" | "torchscript" | "jit") => Ok(CheckpointKind::Script),
            Some("ot" | "safetensors") => Ok(CheckpointKind::Weights),
            other => Err(ExportError::UnsupportedCheckpoint {
                path: path.to_path_buf(),
                reason: format!(
                    "unknown extension {:?} (expected .pt, .pth, .torchscript, .jit, .ot or .safetensors)",
                    other.unwrap_or("")
                ),
            }),
        }
    }
}

/// Architectures `tch::vision` can rebuild around a weights file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Resnet18,
    Resnet34,
    Resnet50,
    MobilenetV2,
    Densenet121,
    EfficientnetB0,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Resnet18 => "resnet18",
            Architecture::Resnet34 => "resnet34",
            Architecture::Resnet50 => "resnet50",
            Architecture::MobilenetV2 => "mobilenet_v2",
            Architecture::Densenet121 => "densenet121",
            Architecture::EfficientnetB0 => "efficientnet_b0",
        }
    }

    fn build(&self, p: &nn::Path, num_classes: i64) -> Box<dyn ModuleT> {
        use tch::vision::{densenet, efficientnet, mobilenet, resnet};
        match self {
            Architecture::Resnet18 => Box::new(resnet::resnet18(p, num_classes)),
            Architecture::Resnet34 => Box::new(resnet::resnet34(p, num_classes)),
            Architecture::Resnet50 => Box::new(resnet::resnet50(p, num_classes)),
            Architecture::MobilenetV2 => Box::new(mobilenet::v2(p, num_classes)),
            Architecture::Densenet121 => Box::new(densenet::densenet121(p, num_classes)),
            Architecture::EfficientnetB0 => Box::new(efficientnet::b0(p, num_classes)),
        }
    }
}

impl FromStr for Architecture {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "resnet18" => Ok(Architecture::Resnet18),
            "resnet34" => Ok(Architecture::Resnet34),
            "resnet50" => Ok(Architecture::Resnet50),
            "mobilenet_v2" | "mobilenetv2" => Ok(Architecture::MobilenetV2),
            "densenet121" => Ok(Architecture::Densenet121),
            "efficientnet_b0" | "efficientnetb0" => Ok(Architecture::EfficientnetB0),
            _ => Err(ExportError::UnknownArchitecture(s.to_string())),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to rebuild when the checkpoint only holds weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightsSpec {
    pub architecture: Architecture,
    pub num_classes: i64,
}

enum Model {
    Script(CModule),
    Weights {
        _vs: nn::VarStore,
        net: Box<dyn ModuleT>,
    },
}

/// A model loaded from disk and switched to inference mode.
pub struct Checkpoint {
    pub path: PathBuf,
    pub kind: CheckpointKind,
    pub device: Device,
    model: Model,
}

impl Checkpoint {
    /// Load `path`. `weights` is only consulted for [`CheckpointKind::Weights`].
    #[tracing::instrument(skip(path, weights), fields(path = %path.display()))]
    pub fn load(
        path: &Path,
        weights: WeightsSpec,
        device: Device,
    ) -> Result<Self, ExportError> {
        if !path.is_file() {
            return Err(ExportError::CheckpointNotFound(path.to_path_buf()));
        }

        let kind = CheckpointKind::from_path(path)?;

        let model = match kind {
            CheckpointKind::Script => {
                let mut module = CModule::load_on_device(path, device)?;
                module.set_eval();
                // The tracer refuses to bake in constants that require grad
                for (_, param) in module.named_parameters()? {
                    let _ = param.set_requires_grad(false);
                }
                Model::Script(module)
            }
            CheckpointKind::Weights => {
                let mut vs = nn::VarStore::new(device);
                let net = weights.architecture.build(&vs.root(), weights.num_classes);
                vs.load(path)?;
                vs.freeze();
                tracing::debug!(
                    architecture = %weights.architecture,
                    num_classes = weights.num_classes,
                    "Rebuilt architecture around weights"
                );
                Model::Weights { _vs: vs, net }
            }
        };

        tracing::info!(?kind, ?device, "Checkpoint loaded");

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            device,
            model,
        })
    }

    /// Eager forward pass in inference mode. Multi-output models yield their
    /// first tensor.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ExportError> {
        match &self.model {
            Model::Script(module) => {
                let output = module.forward_is(&[IValue::Tensor(input.shallow_clone())])?;
                first_tensor(output).ok_or_else(|| {
                    ExportError::Trace("model returned no tensor output".to_string())
                })
            }
            Model::Weights { net, .. } => {
                // tch::vision layers panic on bad shapes instead of erroring
                let size = input.size();
                if size.len() != 4 || size[1] != 3 {
                    return Err(ExportError::Trace(format!(
                        "input shape {:?} does not match [batch, 3, height, width]",
                        size
                    )));
                }
                // Spatial mismatches surface as panics inside non-`f_` ops
                panic::catch_unwind(AssertUnwindSafe(|| net.forward_t(input, false))).map_err(
                    |payload| {
                        ExportError::Trace(format!(
                            "forward pass on input {:?} failed: {}",
                            size,
                            panic_message(payload.as_ref())
                        ))
                    },
                )
            }
        }
    }

    /// Record one forward pass on `example` as a TorchScript module.
    pub fn trace(&self, example: &Tensor) -> Result<CModule, ExportError> {
        let _s = span!("trace");

        let mut failure: Option<ExportError> = None;
        let traced = CModule::create_by_tracing(
            "TracedModel",
            "forward",
            &[example.shallow_clone()],
            &mut |inputs| match self.forward(&inputs[0]) {
                Ok(output) => vec![output],
                Err(e) => {
                    failure = Some(e);
                    Vec::new()
                }
            },
        );

        if let Some(e) = failure {
            return Err(match e {
                ExportError::Torch(inner) => ExportError::Trace(inner.to_string()),
                other => other,
            });
        }

        traced.map_err(|e| ExportError::Trace(e.to_string()))
    }
}

/// First tensor found in a (possibly nested) TorchScript return value.
pub(crate) fn first_tensor(value: IValue) -> Option<Tensor> {
    match value {
        IValue::Tensor(t) => Some(t),
        IValue::TensorList(ts) => ts.into_iter().next(),
        IValue::Tuple(items) | IValue::GenericList(items) => {
            items.into_iter().find_map(first_tensor)
        }
        _ => None,
    }
}
