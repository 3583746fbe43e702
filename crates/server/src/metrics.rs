//! Prometheus metrics
//!
//! Series are recorded through the `metrics` facade across the workspace and
//! rendered here in Prometheus text format.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Install the global Prometheus recorder
///
/// Returns `None` when a recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_default_metrics();
            Some(handle)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        },
    }
}

/// Zero the series that should be visible before first use
fn register_default_metrics() {
    gauge!("voice_turn_sessions_active").set(0.0);
    counter!("voice_turn_sessions_created_total").absolute(0);
    counter!("voice_turn_sessions_evicted_total").absolute(0);
    counter!("voice_turn_barge_in_total").absolute(0);
    counter!("voice_turn_planning_failures_total").absolute(0);
    counter!("voice_turn_reservation_conflicts_total").absolute(0);
}

pub fn record_session_created() {
    counter!("voice_turn_sessions_created_total").increment(1);
}

pub fn record_session_evicted() {
    counter!("voice_turn_sessions_evicted_total").increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("voice_turn_sessions_active").set(count as f64);
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_sessions(state.sessions.count());

    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not enabled".to_string(),
        ),
    }
}
