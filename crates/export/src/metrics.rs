use opentelemetry::{KeyValue, global};
use std::time::Duration;

/// Record the wall time of one export run.
pub fn record_export(pipeline: &'static str, elapsed: Duration) {
    let histogram = global::meter("export")
        .f64_histogram("export_duration_seconds")
        .with_description("Time to load, trace and save one model")
        .with_unit("s")
        .build();

    histogram.record(
        elapsed.as_secs_f64(),
        &[KeyValue::new("pipeline", pipeline)],
    );
}
