use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_messages_sent_total",
            "Messages accepted by the delivery pipeline",
        ),
        &["message_type"],
    )
    .expect("failed to create chat_service_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_messages_sent_total");
    counter
});

pub static CAPABILITY_DENIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_service_capability_denied_total",
        "Send/call requests rejected by level gating",
    )
    .expect("failed to create chat_service_capability_denied_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_capability_denied_total");
    counter
});

pub static CALLS_INITIATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_service_calls_initiated_total",
        "Calls that entered the signaling state machine",
    )
    .expect("failed to create chat_service_calls_initiated_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_calls_initiated_total");
    counter
});

pub static CALLS_TERMINAL_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_calls_terminal_total",
            "Calls reaching a terminal state, by outcome",
        ),
        &["status"],
    )
    .expect("failed to create chat_service_calls_terminal_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_calls_terminal_total");
    counter
});

pub static PUBLISH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_service_publish_failures_total",
        "Realtime publish failures (logged and swallowed)",
    )
    .expect("failed to create chat_service_publish_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_publish_failures_total");
    counter
});

pub static PUSH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_service_push_failures_total",
        "Push notification delivery failures (logged and swallowed)",
    )
    .expect("failed to create chat_service_push_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_push_failures_total");
    counter
});

/// Prometheus text exposition for the default registry.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
