use common::TelemetryGuard;
use export::{CheckpointKind, TraceExportConfig, logging::setup_logging, trace};

const SERVICE_NAME: &str = "trace-checkpoint";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TraceExportConfig::from_env()?;

    let _telemetry = config
        .otel_endpoint
        .as_ref()
        .map(|endpoint| TelemetryGuard::init(SERVICE_NAME, endpoint))
        .transpose()?;

    setup_logging(SERVICE_NAME, config.environment.clone());

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    println!("Loading checkpoint from: {}", config.model_path.display());
    let checkpoint = trace::load(&config)?;
    if checkpoint.kind == CheckpointKind::Weights {
        println!(
            "Rebuilt {} with {} classes around the weights",
            config.weights.architecture, config.weights.num_classes
        );
    }

    println!("Tracing with example input {:?}...", config.input_shape);
    let report = trace::export(&checkpoint, &config)?;

    if let Some(diff) = report.max_abs_diff {
        println!("Traced output verified (max abs diff {diff:.3e})");
    }
    println!("TorchScript model saved at: {}", report.output_path.display());
    Ok(())
}
