//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{record_access_check, record_auth_attempt, AuthOutcome, MetricsState};
pub use tracing::{init_telemetry, shutdown_telemetry};
