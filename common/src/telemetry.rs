// Telemetry module for structured logging, metrics, and tracing

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "cron-scheduler";

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over `log_level`. When `tracing_endpoint` is
/// set, spans are also exported over OTLP.
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider.tracer(SERVICE_NAME))
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and describe the scheduler metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "cron_passes_total",
        "Scheduling passes by outcome (completed, not_leader, failed)"
    );
    describe_counter!(
        "cron_catch_up_total",
        "Passes that covered more than the current minute"
    );
    describe_histogram!(
        "cron_catch_up_minutes",
        "Minutes evaluated by catch-up passes"
    );
    describe_counter!(
        "cron_jobs_scheduled_total",
        "Cron definitions selected for dispatch"
    );
    describe_counter!(
        "cron_registry_invalid_total",
        "Registry entries skipped because they failed to parse"
    );

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");

    Ok(())
}

/// Outcome label of a scheduling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcomeLabel {
    Completed,
    NotLeader,
    Failed,
}

impl PassOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassOutcomeLabel::Completed => "completed",
            PassOutcomeLabel::NotLeader => "not_leader",
            PassOutcomeLabel::Failed => "failed",
        }
    }
}

#[inline]
pub fn record_pass(outcome: PassOutcomeLabel) {
    counter!("cron_passes_total", "outcome" => outcome.as_str()).increment(1);
}

#[inline]
pub fn record_catch_up(minutes: i64) {
    counter!("cron_catch_up_total").increment(1);
    histogram!("cron_catch_up_minutes").record(minutes as f64);
}

#[inline]
pub fn record_job_scheduled(cron_name: &str, queue: &str) {
    counter!(
        "cron_jobs_scheduled_total",
        "cron_name" => cron_name.to_string(),
        "queue" => queue.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_invalid_cron(cron_name: &str) {
    counter!("cron_registry_invalid_total", "cron_name" => cron_name.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        let first = init_logging("info", None);
        let second = init_logging("debug", None);
        // The global subscriber can only be installed once per process
        assert!(first.is_ok() || second.is_err());
    }

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_pass(PassOutcomeLabel::Completed);
        record_pass(PassOutcomeLabel::NotLeader);
        record_catch_up(3);
        record_job_scheduled("backup", "ops");
        record_invalid_cron("broken");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PassOutcomeLabel::Completed.as_str(), "completed");
        assert_eq!(PassOutcomeLabel::NotLeader.as_str(), "not_leader");
        assert_eq!(PassOutcomeLabel::Failed.as_str(), "failed");
    }
}
