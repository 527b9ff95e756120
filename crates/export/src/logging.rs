use common::Environment;

pub fn setup_logging(service_name: &'static str, environment: Environment) {
    common::setup_logging(service_name, environment);
}
