use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_gauge!(
            "status_gateway_active_identifiers",
            "Number of identifiers with a live upstream worker"
        );
        metrics::describe_counter!(
            "status_gateway_upstream_respawns_total",
            "Total number of upstream worker reconnect attempts"
        );
        metrics::describe_counter!(
            "status_gateway_events_forwarded_total",
            "Total number of status events forwarded to subscribers"
        );
        metrics::describe_gauge!(
            "status_gateway_client_sessions",
            "Number of active downstream client sessions"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn metrics_handler(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    let metrics = handle.render();
    (StatusCode::OK, metrics)
}

/// Called when a fresh subscription entry is installed in the store.
pub fn record_identifier_started() {
    metrics::increment_gauge!("status_gateway_active_identifiers", 1.0);
}

/// Called when the fan-out pump tears an entry down.
pub fn record_identifier_stopped() {
    metrics::decrement_gauge!("status_gateway_active_identifiers", 1.0);
}

/// Called each time the upstream worker reconnects after a transient failure.
pub fn record_upstream_respawn() {
    metrics::counter!("status_gateway_upstream_respawns_total", 1);
}

/// Called for every event successfully fanned out to a subscriber.
pub fn record_event_forwarded() {
    metrics::counter!("status_gateway_events_forwarded_total", 1);
}

/// Called when a downstream client session starts.
pub fn record_client_session_started() {
    metrics::increment_gauge!("status_gateway_client_sessions", 1.0);
}

/// Called when a downstream client session ends.
pub fn record_client_session_stopped() {
    metrics::decrement_gauge!("status_gateway_client_sessions", 1.0);
}
