//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Bybit REST round trip
    ApiRequest,
    /// One full strategy engine pass
    EngineCycle,
    /// Order submission round trip
    OrderSubmission,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Account equity in quote currency
    Equity,
    /// Open position count
    OpenPositions,
    /// Running strategy count
    RunningStrategies,
    /// Realized P&L for the current UTC day
    DailyPnl,
    /// Composite risk score (0-100)
    RiskScore,
    /// Remaining requests in the rate window
    RateLimitRemaining,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// REST requests sent
    ApiRequests,
    /// REST requests that failed
    ApiErrors,
    /// Non-hold signals produced by strategies
    SignalsGenerated,
    /// Trades rejected by the risk manager
    RiskRejections,
    /// Orders submitted
    OrdersSubmitted,
}

impl LatencyMetric {
    pub fn name(self) -> &'static str {
        match self {
            LatencyMetric::ApiRequest => "bybitbot_api_request_latency_ms",
            LatencyMetric::EngineCycle => "bybitbot_engine_cycle_latency_ms",
            LatencyMetric::OrderSubmission => "bybitbot_order_submission_latency_ms",
        }
    }
}

impl GaugeMetric {
    pub fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "bybitbot_equity_usd",
            GaugeMetric::OpenPositions => "bybitbot_open_positions",
            GaugeMetric::RunningStrategies => "bybitbot_running_strategies",
            GaugeMetric::DailyPnl => "bybitbot_daily_pnl_usd",
            GaugeMetric::RiskScore => "bybitbot_risk_score",
            GaugeMetric::RateLimitRemaining => "bybitbot_rate_limit_remaining",
        }
    }
}

impl CounterMetric {
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::ApiRequests => "bybitbot_api_requests_total",
            CounterMetric::ApiErrors => "bybitbot_api_errors_total",
            CounterMetric::SignalsGenerated => "bybitbot_signals_total",
            CounterMetric::RiskRejections => "bybitbot_risk_rejections_total",
            CounterMetric::OrdersSubmitted => "bybitbot_orders_submitted_total",
        }
    }
}

/// Start the Prometheus HTTP exporter on all interfaces
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter on {}: {}", addr, e))?;
    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    ::metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    ::metrics::counter!(metric.name()).increment(1);
}
