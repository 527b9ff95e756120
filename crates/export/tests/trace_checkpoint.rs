use export::checkpoint::WeightsSpec;
use export::{Architecture, ExportError, TraceExportConfig, trace};
use std::path::{Path, PathBuf};
use std::process::Command;
use tch::{CModule, Device, Kind, Tensor, nn};
use tempfile::tempdir;

/// Small conv classifier saved as TorchScript: [N, 3, H, W] -> [N, 2]
fn write_conv_classifier(dir: &Path) -> PathBuf {
    let mut vs = nn::VarStore::new(Device::Cpu);
    let conv = nn::conv2d(vs.root() / "conv", 3, 4, 3, Default::default());
    let fc = nn::linear(vs.root() / "fc", 4, 2, Default::default());
    vs.freeze();

    let example = Tensor::zeros([1, 3, 32, 32], (Kind::Float, Device::Cpu));
    let module = CModule::create_by_tracing("Net", "forward", &[example], &mut |inputs| {
        vec![
            inputs[0]
                .apply(&conv)
                .relu()
                .adaptive_avg_pool2d([1, 1])
                .flatten(1, -1)
                .apply(&fc),
        ]
    })
    .unwrap();

    let path = dir.join("classifier.pt");
    module.save(&path).unwrap();
    path
}

fn run_module(path: &Path, input: &Tensor) -> Tensor {
    let module = CModule::load(path).unwrap();
    tch::no_grad(|| module.forward_ts(&[input]).unwrap())
}

/// Test the full load -> trace -> save -> verify sequence
///
/// Tests:
/// - Non-empty output file at the configured path
/// - Output shape of the traced graph
/// - Verification ran and stayed within tolerance
#[test]
fn test_trace_torchscript_checkpoint() {
    let dir = tempdir().unwrap();
    let model_path = write_conv_classifier(dir.path());
    let output_path = dir.path().join("out").join("classifier_ts.pt");

    let config = TraceExportConfig::with_paths(&model_path, &output_path);
    let checkpoint = trace::load(&config).unwrap();
    let report = trace::export(&checkpoint, &config).unwrap();

    assert_eq!(report.output_path, output_path);
    assert!(report.bytes > 0, "exported file should not be empty");
    assert_eq!(std::fs::metadata(&output_path).unwrap().len(), report.bytes);
    assert_eq!(report.input_shape, vec![1, 3, 224, 224]);
    assert_eq!(report.output_shape, vec![1, 2]);

    let diff = report.max_abs_diff.expect("verification enabled by default");
    assert!(diff <= config.tolerance);
}

/// Traced output matches the original model on the seeded input
#[test]
fn test_traced_output_matches_original() {
    let dir = tempdir().unwrap();
    let model_path = write_conv_classifier(dir.path());
    let output_path = dir.path().join("traced.pt");

    let mut config = TraceExportConfig::with_paths(&model_path, &output_path);
    config.seed = 7;
    config.verify = false;

    let checkpoint = trace::load(&config).unwrap();
    trace::export(&checkpoint, &config).unwrap();

    let input = trace::example_input(&config, &checkpoint);
    let original = run_module(&model_path, &input);
    let traced = run_module(&output_path, &input);

    let diff = f64::try_from(&(original - traced).abs().max()).unwrap();
    assert!(diff < 1e-5, "outputs should match (diff {diff})");
}

/// Rebuilding a tch::vision architecture around a weights file
#[test]
fn test_trace_weights_checkpoint() {
    let dir = tempdir().unwrap();
    let weights_path = dir.path().join("resnet18.ot");
    {
        let vs = nn::VarStore::new(Device::Cpu);
        let _net = tch::vision::resnet::resnet18(&vs.root(), 2);
        vs.save(&weights_path).unwrap();
    }
    let output_path = dir.path().join("resnet18_ts.pt");

    let mut config = TraceExportConfig::with_paths(&weights_path, &output_path);
    config.weights = WeightsSpec {
        architecture: Architecture::Resnet18,
        num_classes: 2,
    };
    config.input_shape = vec![1, 3, 64, 64];

    let checkpoint = trace::load(&config).unwrap();
    let report = trace::export(&checkpoint, &config).unwrap();

    assert_eq!(report.output_shape, vec![1, 2]);
    assert!(report.max_abs_diff.unwrap() <= config.tolerance);

    let traced = run_module(&output_path, &Tensor::zeros([1, 3, 64, 64], (Kind::Float, Device::Cpu)));
    assert_eq!(traced.size(), vec![1, 2]);
}

/// Weights for a different head size do not load
#[test]
fn test_weights_with_wrong_head_fail_to_load() {
    let dir = tempdir().unwrap();
    let weights_path = dir.path().join("resnet18.ot");
    {
        let vs = nn::VarStore::new(Device::Cpu);
        let _net = tch::vision::resnet::resnet18(&vs.root(), 2);
        vs.save(&weights_path).unwrap();
    }

    let config = TraceExportConfig::with_paths(&weights_path, dir.path().join("out.pt"));
    assert!(trace::load(&config).is_err(), "1000-class head cannot take 2-class weights");
}

/// Example input that does not fit the model is a tracing error
#[test]
fn test_shape_mismatch_is_a_trace_error() {
    let dir = tempdir().unwrap();
    let model_path = write_conv_classifier(dir.path());
    let output_path = dir.path().join("never.pt");

    let mut config = TraceExportConfig::with_paths(&model_path, &output_path);
    config.input_shape = vec![1, 5, 32, 32];

    let checkpoint = trace::load(&config).unwrap();
    match trace::export(&checkpoint, &config) {
        Err(ExportError::Trace(_)) => {}
        other => panic!("Expected Trace error, got {other:?}"),
    }
    assert!(!output_path.exists(), "nothing is written on failure");
}

/// A rebuilt architecture that cannot shrink the input that far fails
/// with a tracing error instead of aborting the process
#[test]
fn test_weights_spatial_mismatch_is_a_trace_error() {
    let dir = tempdir().unwrap();
    let weights_path = dir.path().join("densenet121.ot");
    {
        let vs = nn::VarStore::new(Device::Cpu);
        let _net = tch::vision::densenet::densenet121(&vs.root(), 2);
        vs.save(&weights_path).unwrap();
    }
    let output_path = dir.path().join("never.pt");

    let mut config = TraceExportConfig::with_paths(&weights_path, &output_path);
    config.weights = WeightsSpec {
        architecture: Architecture::Densenet121,
        num_classes: 2,
    };
    // The final 7x7 pooling needs at least 224x224
    config.input_shape = vec![1, 3, 64, 64];

    let checkpoint = trace::load(&config).unwrap();
    match trace::export(&checkpoint, &config) {
        Err(ExportError::Trace(msg)) => assert!(msg.contains("[1, 3, 64, 64]"), "{msg}"),
        other => panic!("Expected Trace error, got {other:?}"),
    }
    assert!(!output_path.exists(), "nothing is written on failure");
}

#[test]
fn test_missing_checkpoint() {
    let dir = tempdir().unwrap();
    let config =
        TraceExportConfig::with_paths(dir.path().join("missing.pt"), dir.path().join("out.pt"));

    match trace::load(&config) {
        Err(ExportError::CheckpointNotFound(path)) => assert!(path.ends_with("missing.pt")),
        Err(other) => panic!("Expected CheckpointNotFound, got {other:?}"),
        Ok(_) => panic!("Expected CheckpointNotFound"),
    }
}

#[test]
fn test_unknown_checkpoint_format() {
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("model.onnx");
    std::fs::write(&model_path, b"onnx bytes").unwrap();

    let config = TraceExportConfig::with_paths(&model_path, dir.path().join("out.pt"));
    assert!(matches!(
        trace::load(&config),
        Err(ExportError::UnsupportedCheckpoint { .. })
    ));
}

#[test]
fn test_corrupt_checkpoint_is_an_error() {
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("model.pt");
    std::fs::write(&model_path, b"truncated").unwrap();

    let config = TraceExportConfig::with_paths(&model_path, dir.path().join("out.pt"));
    assert!(matches!(trace::load(&config), Err(ExportError::Torch(_))));
}

/// Existing output is replaced without complaint
#[test]
fn test_existing_output_is_overwritten() {
    let dir = tempdir().unwrap();
    let model_path = write_conv_classifier(dir.path());
    let output_path = dir.path().join("traced.pt");
    std::fs::write(&output_path, b"stale").unwrap();

    let config = TraceExportConfig::with_paths(&model_path, &output_path);
    let checkpoint = trace::load(&config).unwrap();
    trace::export(&checkpoint, &config).unwrap();

    let reloaded = run_module(&output_path, &Tensor::zeros([1, 3, 32, 32], (Kind::Float, Device::Cpu)));
    assert_eq!(reloaded.size(), vec![1, 2]);
}

/// Two runs with the same inputs give functionally equivalent files
#[test]
fn test_rerun_is_equivalent() {
    let dir = tempdir().unwrap();
    let model_path = write_conv_classifier(dir.path());

    let first = dir.path().join("first.pt");
    let second = dir.path().join("second.pt");

    for output in [&first, &second] {
        let config = TraceExportConfig::with_paths(&model_path, output);
        let checkpoint = trace::load(&config).unwrap();
        trace::export(&checkpoint, &config).unwrap();
    }

    tch::manual_seed(123);
    let input = Tensor::randn([2, 3, 48, 48], (Kind::Float, Device::Cpu));
    let a = run_module(&first, &input);
    let b = run_module(&second, &input);

    assert_eq!(a.size(), b.size());
    let diff = f64::try_from(&(a - b).abs().max()).unwrap();
    assert_eq!(diff, 0.0);
}

#[test]
fn test_binary_fails_on_missing_checkpoint() {
    let dir = tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_trace-checkpoint"))
        .env("MODEL_PATH", dir.path().join("missing.pt"))
        .env("OUTPUT_PATH", dir.path().join("out.pt"))
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!dir.path().join("out.pt").exists());
}

#[test]
fn test_binary_writes_output() {
    let dir = tempdir().unwrap();
    let model_path = write_conv_classifier(dir.path());
    let output_path = dir.path().join("bin_out.pt");

    let output = Command::new(env!("CARGO_BIN_EXE_trace-checkpoint"))
        .env("MODEL_PATH", &model_path)
        .env("OUTPUT_PATH", &output_path)
        .env("INPUT_SHAPE", "1,3,32,32")
        .env("DEVICE", "cpu")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TorchScript model saved at:"));
    assert!(std::fs::metadata(&output_path).unwrap().len() > 0);
}
