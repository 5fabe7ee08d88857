use actix_web::{http::header, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_messages_sent_total",
            "Messages persisted by housing-chat-service",
        ),
        &["message_type"],
    )
    .expect("failed to create chat_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_messages_sent_total");
    counter
});

pub static REALTIME_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_realtime_events_total",
            "Realtime events by type and delivery outcome",
        ),
        &["event", "outcome"],
    )
    .expect("failed to create chat_realtime_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_realtime_events_total");
    counter
});

pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("chat_ws_connections", "Open websocket sessions")
        .expect("failed to create chat_ws_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_ws_connections");
    gauge
});

pub static ONLINE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("chat_online_users", "Users with an identified connection")
        .expect("failed to create chat_online_users");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_online_users");
    gauge
});

pub fn record_event(event: &str, outcome: &str) {
    REALTIME_EVENTS_TOTAL
        .with_label_values(&[event, outcome])
        .inc();
}

/// Force registration so `/metrics` lists every series from the first scrape.
pub fn init() {
    Lazy::force(&MESSAGES_SENT_TOTAL);
    Lazy::force(&REALTIME_EVENTS_TOTAL);
    Lazy::force(&WS_CONNECTIONS);
    Lazy::force(&ONLINE_USERS);
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %err, "failed to encode prometheus metrics");
        return HttpResponse::InternalServerError().body(err.to_string());
    }
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, encoder.format_type()))
        .body(buffer)
}
