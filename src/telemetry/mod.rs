//! Telemetry module
//!
//! Logging and Prometheus metrics

mod logging;
mod metrics;

pub use logging::{build_filter, init_logging};
pub use metrics::{
    increment, init_metrics, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};

use crate::config::TelemetryConfig;
use tracing_appender::non_blocking::WorkerGuard;

/// Guard that flushes buffered log output on drop
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let file_guard = init_logging(config)?;

    if config.metrics_port > 0 {
        if let Err(e) = init_metrics(config.metrics_port) {
            tracing::warn!(error = %e, "Continuing without metrics exporter");
        }
    }

    Ok(TelemetryGuard {
        _file_guard: file_guard,
    })
}
