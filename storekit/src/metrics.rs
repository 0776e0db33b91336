use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    pub static ref STORE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "storekit_operation_duration_seconds",
        "Store operation duration in seconds",
        &["operation", "backend", "status"]
    ).expect("storekit_operation_duration_seconds registers once");

    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "storekit_operations_total",
        "Total number of store operations",
        &["operation", "backend", "status"]
    ).expect("storekit_operations_total registers once");

    pub static ref ACTIVE_HANDLERS: IntGaugeVec = register_int_gauge_vec!(
        "storekit_active_handlers",
        "Number of connected store handlers",
        &["backend"]
    ).expect("storekit_active_handlers registers once");
}

pub fn record_operation(operation: &str, backend: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    STORE_OPERATION_DURATION
        .with_label_values(&[operation, backend, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, backend, status])
        .inc();
}

pub fn handler_connected(backend: &str) {
    ACTIVE_HANDLERS.with_label_values(&[backend]).inc();
}

pub fn handler_released(backend: &str) {
    ACTIVE_HANDLERS.with_label_values(&[backend]).dec();
}

/// Text exposition of the default registry.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
