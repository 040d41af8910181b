use prometheus::{CounterVec, HistogramVec, IntGaugeVec};

lazy_static::lazy_static! {
    pub static ref QUERIES_TOTAL: CounterVec = prometheus::register_counter_vec!(
        "planbench_queries_total",
        "Plan-analysis queries attempted, by outcome",
        &["backend", "outcome"]
    ).unwrap();

    pub static ref BATCHES_TOTAL: CounterVec = prometheus::register_counter_vec!(
        "planbench_batches_total",
        "Batches appended to the result store",
        &["backend"]
    ).unwrap();

    pub static ref CONNECTION_FAILURES_TOTAL: CounterVec = prometheus::register_counter_vec!(
        "planbench_connection_failures_total",
        "Tasks aborted because no connection could be acquired",
        &["backend"]
    ).unwrap();

    pub static ref TASKS_IN_FLIGHT: IntGaugeVec = prometheus::register_int_gauge_vec!(
        "planbench_tasks_in_flight",
        "Batches currently admitted per backend",
        &["backend"]
    ).unwrap();

    pub static ref QUERY_DURATION_SECONDS: HistogramVec = prometheus::register_histogram_vec!(
        "planbench_query_duration_seconds",
        "Wall-clock latency of EXPLAIN ANALYZE round trips",
        &["backend"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
}

/// Prometheus text exposition of every registered metric
pub fn render() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
