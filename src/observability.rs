use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests dispatched. Labels: op.
pub const REQUESTS_TOTAL: &str = "huddle_requests_total";

/// Histogram: request handling latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "huddle_request_duration_seconds";

/// Counter: duplicate requests answered from the reply cache.
pub const DUPLICATE_HITS_TOTAL: &str = "huddle_duplicate_hits_total";

/// Counter: datagrams dropped because they failed to decode.
pub const MALFORMED_FRAMES_TOTAL: &str = "huddle_malformed_frames_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: monitor callback frames sent.
pub const CALLBACKS_SENT_TOTAL: &str = "huddle_callbacks_sent_total";

/// Gauge: monitor subscriptions currently registered.
pub const MONITOR_SUBSCRIPTIONS_ACTIVE: &str = "huddle_monitor_subscriptions_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::Query { .. } => "query",
        Request::Book { .. } => "book",
        Request::Change { .. } => "change",
        Request::Monitor { .. } => "monitor",
        Request::Cancel { .. } => "cancel",
        Request::AddParticipant { .. } => "add_participant",
    }
}
