use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

use crate::error::ErrorCode;

pub static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notification_relay_active_connections",
        "Open realtime connections",
    )
    .expect("failed to create notification_relay_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_relay_active_connections");
    gauge
});

/// One dedicated broker connection per subscription, so this is also the
/// number of pub/sub connections held open against Redis.
pub static ACTIVE_SUBSCRIPTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notification_relay_active_subscriptions",
        "Live channel subscriptions (each holds a dedicated broker connection)",
    )
    .expect("failed to create notification_relay_active_subscriptions");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_relay_active_subscriptions");
    gauge
});

pub static NOTIFICATIONS_FORWARDED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_relay_notifications_forwarded_total",
        "Broker messages forwarded to clients",
    )
    .expect("failed to create notification_relay_notifications_forwarded_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_relay_notifications_forwarded_total");
    counter
});

static SUBSCRIPTION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_relay_subscription_failures_total",
            "Failed subscription attempts by client-visible error code",
        ),
        &["code"],
    )
    .expect("failed to create notification_relay_subscription_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_relay_subscription_failures_total");
    counter
});

pub fn record_subscription_failure(code: ErrorCode) {
    SUBSCRIPTION_FAILURES
        .with_label_values(&[code.as_str()])
        .inc();
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
