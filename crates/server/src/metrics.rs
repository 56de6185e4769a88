use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

// Prometheus metrics (default registry)
pub static STORAGE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "whiteboard_storage_requests_total",
        "Storage API requests by operation",
        &["op"]
    )
    .expect("register storage_requests_total")
});

pub static STORAGE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "whiteboard_storage_errors_total",
        "Storage API requests that failed with a server error"
    )
    .expect("register storage_errors_total")
});

pub fn record(op: &str) {
    STORAGE_REQUESTS_TOTAL.with_label_values(&[op]).inc();
}

pub fn encode_metrics() -> (axum::http::StatusCode, String) {
    // make sure both families show up even before the first request
    Lazy::force(&STORAGE_REQUESTS_TOTAL);
    Lazy::force(&STORAGE_ERRORS_TOTAL);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
