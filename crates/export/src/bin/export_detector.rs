use common::TelemetryGuard;
use export::{DetectorExportConfig, detector, logging::setup_logging};

const SERVICE_NAME: &str = "export-detector";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DetectorExportConfig::from_env()?;

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

    println!("Loading detection model from: {}", config.model_path.display());
    let checkpoint = detector::load(&config)?;
    println!("Model loaded successfully");

    println!("Converting model to TorchScript...");
    let report = detector::export(&checkpoint, &config)?;

    println!(
        "TorchScript model saved at: {} ({} classes, metadata in {})",
        report.output_path.display(),
        report.head.num_classes,
        report.metadata_path.display()
    );
    Ok(())
}
