pub mod config;
pub mod logging;
pub mod panic;
pub mod telemetry;

pub use config::{Environment, otel_endpoint_from_env};
pub use logging::setup_logging;
pub use panic::panic_message;
pub use telemetry::TelemetryGuard;
