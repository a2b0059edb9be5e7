use chrono::Utc;
use rand::Rng;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_tracing(default_filter: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    // try_init: tests and embedding callers may already have a subscriber
    let _ = if json { builder.json().flatten_event(true).try_init() } else { builder.compact().try_init() };
}

/// `YYYYMMDDHHMMSS-xxxx`, stamped on the root span of every run.
pub fn new_run_id() -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("{}-{:04x}", Utc::now().format("%Y%m%d%H%M%S"), suffix)
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], port)).install()?;
    tracing::info!(port, "Prometheus exporter listening on /metrics");
    metrics::gauge!("depth_sampler_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_port: u16) -> anyhow::Result<()> {
    Ok(())
}
