// src/observability.rs
//! Logging and metrics
//!
//! Every non-fatal delegate failure is both logged by the stage that saw
//! it and counted here, so a failure is never visible in only one place.

use crate::delegate::Verb;
use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{ForwarderError, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DELEGATE_CALLS: &str = "forwarder_delegate_calls_total";
pub const DELEGATE_FAILURES: &str = "forwarder_delegate_failures_total";
pub const DELEGATE_DURATION: &str = "forwarder_delegate_duration_seconds";
pub const MECHANISMS_AUGMENTED: &str = "forwarder_mechanisms_augmented_total";

/// Install the global tracing subscriber
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| ForwarderError::ConfigError(format!("Failed to install tracing: {}", e)))
}

/// Install the Prometheus exporter when a listen address is configured
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    let Some(listen_addr) = &config.listen_addr else {
        return Ok(());
    };

    let addr: SocketAddr = listen_addr.parse().map_err(|e| {
        ForwarderError::ConfigError(format!("Invalid metrics address '{}': {}", listen_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ForwarderError::ConfigError(format!("Failed to install metrics exporter: {}", e)))?;

    info!("Metrics exported on {}", addr);
    Ok(())
}

pub fn record_delegate_call(verb: Verb, elapsed: Duration) {
    counter!(DELEGATE_CALLS, "verb" => verb.as_str()).increment(1);
    histogram!(DELEGATE_DURATION, "verb" => verb.as_str()).record(elapsed.as_secs_f64());
}

pub fn record_delegate_failure(err: &ForwarderError) {
    let verb = err.verb().map_or("none", Verb::as_str);
    counter!(DELEGATE_FAILURES, "verb" => verb, "kind" => err.kind()).increment(1);
}

pub fn record_augmentation(action: &'static str) {
    counter!(MECHANISMS_AUGMENTED, "action" => action).increment(1);
}
