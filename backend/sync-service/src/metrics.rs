use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "sync_service_events_total",
            "Deliveries processed by sync-service, by disposition",
        ),
        &["queue", "kind", "outcome"],
    )
    .expect("failed to create sync_service_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register sync_service_events_total");
    counter
});

static HANDLER_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "sync_service_handler_duration_seconds",
            "Handler latency for sync-service, retries included",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["queue", "kind"],
    )
    .expect("failed to create sync_service_handler_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register sync_service_handler_duration_seconds");
    histogram
});

/// Count one delivery. `kind` is `"unknown"` when the type header did not resolve.
pub fn record_event(queue: &str, kind: &str, outcome: &str) {
    EVENTS_TOTAL.with_label_values(&[queue, kind, outcome]).inc();
}

pub fn observe_handler(queue: &str, kind: &str, elapsed: Duration) {
    HANDLER_DURATION_SECONDS
        .with_label_values(&[queue, kind])
        .observe(elapsed.as_secs_f64());
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}
