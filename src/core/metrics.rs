use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_none() {
        let handle = PrometheusBuilder::new().install_recorder()?;
        let _ = PROM_HANDLE.set(handle);
        describe();
    }
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("http_requests_total", "HTTP responses by status code");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency"
    );
    metrics::describe_counter!("grading_jobs_total", "Grading jobs by outcome");
    metrics::describe_counter!("grading_failures_total", "Failed grading attempts by reason");
    metrics::describe_counter!("grading_jobs_rejected_total", "Jobs refused at enqueue time");
    metrics::describe_histogram!(
        "grading_job_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of one grading job"
    );
    metrics::describe_histogram!(
        "inference_duration_seconds",
        metrics::Unit::Seconds,
        "Model generation latency"
    );
    metrics::describe_gauge!("grading_queue_depth", "Jobs waiting for a worker");
    metrics::describe_counter!("stats_notifications_total", "Stats notifications by outcome");
    metrics::describe_counter!(
        "submission_status_write_failures_total",
        "Terminal status writes that did not land"
    );
}
