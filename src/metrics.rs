use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGaugeVec, Opts, TextEncoder};

pub static ACTIVE_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "relay_service_active_connections",
            "Registered WebSocket connections by purpose and client class",
        ),
        &["purpose", "client_class"],
    )
    .expect("failed to create relay_service_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register relay_service_active_connections");
    gauge
});

pub static MESSAGES_PERSISTED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "relay_service_messages_persisted_total",
        "Direct messages written to the durable store",
    )
    .expect("failed to create relay_service_messages_persisted_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_service_messages_persisted_total");
    counter
});

pub static MESSAGES_DELIVERED_LIVE: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "relay_service_messages_delivered_live_total",
        "Messages pushed to a live connection at send time",
    )
    .expect("failed to create relay_service_messages_delivered_live_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_service_messages_delivered_live_total");
    counter
});

pub static MESSAGES_REPLAYED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "relay_service_messages_replayed_total",
        "Offline messages replayed on reconnect",
    )
    .expect("failed to create relay_service_messages_replayed_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_service_messages_replayed_total");
    counter
});

pub static NOTIFICATIONS_QUEUED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "relay_service_notifications_queued_total",
        "Notifications persisted for offline delivery",
    )
    .expect("failed to create relay_service_notifications_queued_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_service_notifications_queued_total");
    counter
});

pub static NOTIFICATIONS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "relay_service_notifications_delivered_total",
        "Notifications pushed to a live connection, directly or via replay",
    )
    .expect("failed to create relay_service_notifications_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_service_notifications_delivered_total");
    counter
});

pub static HEARTBEAT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "relay_service_heartbeat_failures_total",
        "Heartbeat pings that found a dead connection",
    )
    .expect("failed to create relay_service_heartbeat_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_service_heartbeat_failures_total");
    counter
});

pub async fn metrics_handler() -> HttpResponse {
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
