//! Prometheus metrics

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Ticks dispatched to a position
    TickProcessed,
    /// Ticks dropped (bad price or unknown instrument)
    TickDropped,
    /// Exits confirmed by the executor
    ExitExecuted,
    /// Exit attempts that failed or timed out
    ExitFailed,
    /// Exit requests skipped (lock held or tracker inactive)
    ExitSkipped,
    /// Exit requests raised by the sweep path
    SweepExitRequested,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Open position count
    OpenPositions,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One tick through cache update and evaluation
    TickDispatch,
    /// One full sweep pass
    SweepPass,
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::TickProcessed => "optsentry_ticks_processed_total",
        CounterMetric::TickDropped => "optsentry_ticks_dropped_total",
        CounterMetric::ExitExecuted => "optsentry_exits_executed_total",
        CounterMetric::ExitFailed => "optsentry_exits_failed_total",
        CounterMetric::ExitSkipped => "optsentry_exits_skipped_total",
        CounterMetric::SweepExitRequested => "optsentry_sweep_exits_requested_total",
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    counter!(counter_name(metric)).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::OpenPositions => "optsentry_open_positions",
    };
    gauge!(name).set(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = match metric {
        LatencyMetric::TickDispatch => "optsentry_tick_dispatch_ms",
        LatencyMetric::SweepPass => "optsentry_sweep_pass_ms",
    };
    histogram!(name).record(duration.as_secs_f64() * 1000.0);
}

/// Install the Prometheus exporter on the given port
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_counter!(
        "optsentry_ticks_processed_total",
        "Ticks dispatched to a cached position"
    );
    describe_counter!(
        "optsentry_ticks_dropped_total",
        "Ticks dropped for bad price or unknown instrument"
    );
    describe_counter!(
        "optsentry_exits_executed_total",
        "Exits confirmed by the executor"
    );
    describe_counter!(
        "optsentry_exits_failed_total",
        "Exit attempts that failed or timed out"
    );
    describe_counter!(
        "optsentry_exits_skipped_total",
        "Exit requests skipped under lock contention or on inactive trackers"
    );
    describe_counter!(
        "optsentry_sweep_exits_requested_total",
        "Exit requests raised by the periodic sweep"
    );
    describe_gauge!("optsentry_open_positions", "Open position count");
    describe_histogram!("optsentry_tick_dispatch_ms", "Tick dispatch latency");
    describe_histogram!("optsentry_sweep_pass_ms", "Sweep pass duration");

    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}
