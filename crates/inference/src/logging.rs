use crate::config::InferenceConfig;

pub const SERVICE_NAME: &str = "detect-nsfw";

pub fn setup_logging(config: &InferenceConfig) {
    common::setup_logging(SERVICE_NAME, config.environment.clone());
}
