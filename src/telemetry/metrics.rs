//! Application metrics using the metrics crate.

use std::sync::OnceLock;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    /// Installs the global Prometheus recorder on first use. Later states
    /// share the same handle.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let handle = PROMETHEUS_HANDLE.get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| tracing::warn!(error = %e, "Prometheus recorder unavailable"))
                .ok()
        });

        Self {
            handle: handle.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    EmailTaken,
    InvalidToken,
    UnknownUser,
}

impl AuthOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::EmailTaken => "email_taken",
            AuthOutcome::InvalidToken => "invalid_token",
            AuthOutcome::UnknownUser => "unknown_user",
        }
    }
}

pub fn record_auth_attempt(action: &str, outcome: AuthOutcome) {
    counter!(
        "auth_attempts_total",
        "action" => action.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

pub fn record_access_check(capability: &'static str, granted: bool) {
    counter!(
        "access_checks_total",
        "capability" => capability,
        "granted" => granted.to_string()
    )
    .increment(1);
}

pub fn record_issue_query(rows: usize, duration: Duration) {
    histogram!("issue_query_duration_seconds").record(duration.as_secs_f64());
    histogram!("issue_query_rows").record(rows as f64);
}

pub fn record_request_latency(method: &str, path: &str, status: u16, duration: Duration) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_outcome_as_str() {
        assert_eq!(AuthOutcome::Success.as_str(), "success");
        assert_eq!(
            AuthOutcome::InvalidCredentials.as_str(),
            "invalid_credentials"
        );
        assert_eq!(AuthOutcome::UnknownUser.as_str(), "unknown_user");
    }

    #[test]
    fn test_metrics_state_disabled() {
        let state = MetricsState::disabled();
        assert!(!state.is_enabled());
        assert!(state.render().is_none());
    }

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        record_access_check("member", true);
        record_issue_query(3, Duration::from_millis(4));
    }
}
