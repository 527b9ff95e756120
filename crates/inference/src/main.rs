use clap::Parser;
use common::TelemetryGuard;
use inference::{
    InferenceConfig, InferenceService,
    backend::InferenceBackend,
    logging::{SERVICE_NAME, setup_logging},
};
use std::path::PathBuf;

#[cfg(all(feature = "ort-backend", not(feature = "tch-backend")))]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(feature = "tch-backend")]
use inference::backend::tch::TchBackend as Backend;

#[cfg(not(any(feature = "ort-backend", feature = "tch-backend")))]
compile_error!("At least one backend feature must be enabled: 'ort-backend' or 'tch-backend'");

#[derive(Parser, Debug)]
#[command(about = "Label a single image as NSFW or SAFE.")]
struct Args {
    /// Image file to classify.
    image: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = InferenceConfig::from_env()?;

    let _telemetry = config
        .otel_endpoint
        .as_ref()
        .map(|endpoint| TelemetryGuard::init(SERVICE_NAME, endpoint))
        .transpose()?;

    setup_logging(&config);

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    tracing::info!("Loading classifier");
    let backend = Backend::load_model(&config.model_path, config.execution_provider)?;
    tracing::info!("Model loaded successfully");

    let mut service = InferenceService::new(backend, &config);
    let prediction = service.classify(&args.image)?;

    println!("{}", prediction.verdict);
    Ok(())
}
