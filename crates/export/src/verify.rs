use crate::checkpoint::first_tensor;
use crate::error::ExportError;
use common::span;
use std::path::Path;
use tch::{CModule, Device, IValue, Kind, Tensor};

/// Largest element-wise difference between two tensors of the same shape.
pub fn max_abs_diff(expected: &Tensor, actual: &Tensor) -> Result<f64, ExportError> {
    if expected.size() != actual.size() {
        return Err(ExportError::ShapeMismatch {
            expected: expected.size(),
            actual: actual.size(),
        });
    }

    let diff = (expected.to_kind(Kind::Double) - actual.to_kind(Kind::Double))
        .abs()
        .max();
    Ok(f64::try_from(&diff)?)
}

/// Reload a saved TorchScript file and run it once on `input`.
pub fn run_saved(path: &Path, device: Device, input: &Tensor) -> Result<Tensor, ExportError> {
    let mut module = CModule::load_on_device(path, device)?;
    module.set_eval();

    let output = tch::no_grad(|| module.forward_is(&[IValue::Tensor(input.shallow_clone())]))?;
    first_tensor(output)
        .ok_or_else(|| ExportError::Trace("exported model returned no tensor output".to_string()))
}

/// Check that the file at `path` reproduces `expected` on `input`.
///
/// Returns the observed maximum absolute difference.
pub fn verify_saved(
    path: &Path,
    device: Device,
    input: &Tensor,
    expected: &Tensor,
    tolerance: f64,
) -> Result<f64, ExportError> {
    let _s = span!("verify");

    let actual = run_saved(path, device, input)?;
    let max_abs_diff = max_abs_diff(expected, &actual)?;

    if max_abs_diff > tolerance || max_abs_diff.is_nan() {
        return Err(ExportError::VerificationFailed {
            max_abs_diff,
            tolerance,
        });
    }

    tracing::info!(max_abs_diff, tolerance, "Traced output matches eager output");
    Ok(max_abs_diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_abs_diff() {
        let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0]);
        let b = Tensor::from_slice(&[1.0f32, 2.5, 2.0]);

        let diff = max_abs_diff(&a, &b).unwrap();
        assert!((diff - 1.0).abs() < 1e-9);
        assert_eq!(max_abs_diff(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_max_abs_diff_rejects_shape_change() {
        let a = Tensor::zeros([1, 4], (Kind::Float, Device::Cpu));
        let b = Tensor::zeros([4], (Kind::Float, Device::Cpu));

        match max_abs_diff(&a, &b) {
            Err(ExportError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![1, 4]);
                assert_eq!(actual, vec![4]);
            }
            other => panic!("Expected ShapeMismatch, got {other:?}"),
        }
    }
}
