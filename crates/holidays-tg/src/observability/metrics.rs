use super::GLOBAL_LABELS;
use crate::config::from_env_or_panic;
use serde::Deserialize;

/// Histogram buckets to measure the distribution of request durations in seconds
const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Deserialize)]
struct MetricsConfig {
    /// Metrics are not exported at all if the port isn't set
    metrics_port: Option<u16>,
}

pub fn init_metrics() {
    let config: MetricsConfig = from_env_or_panic("");

    let Some(port) = config.metrics_port else {
        return;
    };

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets(DEFAULT_DURATION_BUCKETS)
        .expect("BUG: the default histogram buckets must not be empty");

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .expect("BUG: failed to initialize the metrics listener");
}
