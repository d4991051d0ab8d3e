//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for every runtime component:
//! - Broadcaster membership and publish rounds
//! - Engine folds and terminal states
//! - Persistence appends, compactions and failures
//!
//! Recording goes through the `metrics` facade, so nothing is exported until a
//! recorder is installed. [`install_prometheus`] installs one and hands back a
//! handle whose `render()` output can be served by whatever HTTP layer the
//! application already has.
//!
//! # Example
//!
//! ```rust,no_run
//! use streamfold_runtime::metrics::install_prometheus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Describe all metrics and install a Prometheus recorder.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a global recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    let handle = builder
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();

    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Broadcaster Metrics
    describe_gauge!(
        "streamfold_broadcast_subscribers",
        "Current number of subscribers per broadcaster"
    );
    describe_counter!(
        "streamfold_broadcast_rounds_total",
        "Total number of completed publish rounds"
    );
    describe_histogram!(
        "streamfold_broadcast_round_duration_seconds",
        "Time from registry snapshot to the last acknowledgment of a round"
    );
    describe_counter!(
        "streamfold_broadcast_terminated_total",
        "Total number of broadcaster terminal signals, by outcome"
    );

    // Engine Metrics
    describe_counter!(
        "streamfold_engine_events_reduced_total",
        "Total number of events folded by engines"
    );
    describe_counter!(
        "streamfold_engine_stopped_total",
        "Total number of engines that stopped, by outcome"
    );

    // Persistence Metrics
    describe_counter!(
        "streamfold_persistence_recovered_events_total",
        "Total number of log entries replayed during recovery"
    );
    describe_counter!(
        "streamfold_persistence_appends_total",
        "Total number of changes appended to journals"
    );
    describe_counter!(
        "streamfold_persistence_compactions_total",
        "Total number of snapshot + truncate compactions"
    );
    describe_counter!(
        "streamfold_persistence_failures_total",
        "Total number of journal write failures"
    );
}

/// Broadcaster metrics recorder.
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    /// Record the registry size after a join or departure.
    #[allow(clippy::cast_precision_loss)] // Subscriber counts stay far below 2^52
    pub fn record_subscribers(component: &str, subscribers: usize) {
        gauge!("streamfold_broadcast_subscribers", "component" => component.to_string())
            .set(subscribers as f64);
    }

    /// Record a completed publish round.
    pub fn record_round(component: &str, elapsed: Duration) {
        counter!("streamfold_broadcast_rounds_total", "component" => component.to_string())
            .increment(1);
        histogram!(
            "streamfold_broadcast_round_duration_seconds",
            "component" => component.to_string()
        )
        .record(elapsed.as_secs_f64());
    }

    /// Record a terminal signal.
    pub fn record_terminated(component: &str, outcome: &'static str) {
        counter!(
            "streamfold_broadcast_terminated_total",
            "component" => component.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        gauge!("streamfold_broadcast_subscribers", "component" => component.to_string()).set(0.0);
    }
}

/// Engine metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record one folded event.
    pub fn record_reduced(component: &str) {
        counter!("streamfold_engine_events_reduced_total", "component" => component.to_string())
            .increment(1);
    }

    /// Record an engine stopping.
    pub fn record_stopped(component: &str, outcome: &'static str) {
        counter!(
            "streamfold_engine_stopped_total",
            "component" => component.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// Persistence metrics recorder.
pub struct PersistenceMetrics;

impl PersistenceMetrics {
    /// Record a completed recovery.
    pub fn record_recovered(component: &str, replayed: usize) {
        counter!(
            "streamfold_persistence_recovered_events_total",
            "component" => component.to_string()
        )
        .increment(replayed as u64);
    }

    /// Record an append.
    pub fn record_append(component: &str) {
        counter!("streamfold_persistence_appends_total", "component" => component.to_string())
            .increment(1);
    }

    /// Record a compaction.
    pub fn record_compaction(component: &str) {
        counter!("streamfold_persistence_compactions_total", "component" => component.to_string())
            .increment(1);
    }

    /// Record a failed journal write.
    pub fn record_failure(component: &str) {
        counter!("streamfold_persistence_failures_total", "component" => component.to_string())
            .increment(1);
    }
}
