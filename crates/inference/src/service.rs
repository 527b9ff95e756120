use crate::{
    backend::InferenceBackend,
    config::InferenceConfig,
    postprocessing::{PostProcessor, Prediction, Verdict},
};
use common::span;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use preprocess::PreProcessor;
use std::path::Path;
use std::time::{Duration, Instant};

struct Metrics {
    duration: Histogram<f64>,
    verdicts: Counter<u64>,
}

impl Metrics {
    fn init(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0,
        ];
        let duration = meter
            .f64_histogram("inference_duration_seconds")
            .with_description("Time to classify one image (decode + preprocess + forward)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let verdicts = meter
            .u64_counter("inference_verdicts_total")
            .with_description("Classified images by verdict")
            .build();

        Self { duration, verdicts }
    }

    fn record(&self, elapsed: Duration, verdict: Verdict) {
        self.duration.record(elapsed.as_secs_f64(), &[]);
        self.verdicts
            .add(1, &[KeyValue::new("verdict", verdict.as_str())]);
    }
}

/// Load once, classify once: image in, verdict out.
pub struct InferenceService<B: InferenceBackend> {
    backend: B,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
    metrics: Metrics,
}

impl<B: InferenceBackend> InferenceService<B> {
    pub fn new(backend: B, config: &InferenceConfig) -> Self {
        Self {
            backend,
            preprocessor: PreProcessor::new(config.input_size, config.normalization),
            postprocessor: PostProcessor::new(config.flagged_class),
            metrics: Metrics::init("inference"),
        }
    }

    #[tracing::instrument(skip(self), fields(image = %image_path.display()))]
    pub fn classify(&mut self, image_path: &Path) -> anyhow::Result<Prediction> {
        let start = Instant::now();

        let input = self.preprocessor.preprocess_path(image_path)?;

        let output = {
            let _s = span!("forward");
            self.backend.infer(&input)?
        };

        let prediction = self.postprocessor.classify(&output.logits.view())?;

        self.metrics.record(start.elapsed(), prediction.verdict);

        tracing::info!(
            class_index = prediction.class_index,
            score = prediction.score,
            verdict = %prediction.verdict,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Classified image"
        );

        Ok(prediction)
    }
}
