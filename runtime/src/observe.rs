//! Default observer: structured logs plus metrics.

use crate::metrics::{BroadcastMetrics, EngineMetrics, PersistenceMetrics};
use streamfold_core::{Observation, Observer};

/// Forwards observations to `tracing` and the `metrics` facade.
///
/// Routine traffic (rounds, folds, appends) logs at `trace`; membership at
/// `debug`; lifecycle at `info`; failures at `warn`/`error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, observation: Observation<'_>) {
        match observation {
            Observation::Subscribed {
                component,
                subscribers,
            } => {
                tracing::debug!(component, subscribers, "Subscriber joined");
                BroadcastMetrics::record_subscribers(component, subscribers);
            },
            Observation::Unsubscribed {
                component,
                subscribers,
            } => {
                tracing::debug!(component, subscribers, "Subscriber left");
                BroadcastMetrics::record_subscribers(component, subscribers);
            },
            Observation::Published {
                component,
                subscribers,
                elapsed,
            } => {
                tracing::trace!(component, subscribers, ?elapsed, "Publish round complete");
                BroadcastMetrics::record_round(component, elapsed);
            },
            Observation::Terminated {
                component,
                error: None,
                subscribers,
            } => {
                tracing::info!(component, subscribers, "Broadcaster ended");
                BroadcastMetrics::record_terminated(component, "ended");
            },
            Observation::Terminated {
                component,
                error: Some(error),
                subscribers,
            } => {
                tracing::warn!(component, subscribers, %error, "Broadcaster failed");
                BroadcastMetrics::record_terminated(component, error.kind());
            },
            Observation::Reduced {
                component,
                position,
            } => {
                tracing::trace!(component, %position, "Event folded");
                EngineMetrics::record_reduced(component);
            },
            Observation::EngineStopped {
                component,
                position,
                error: None,
            } => {
                tracing::info!(component, %position, "Engine input ended");
                EngineMetrics::record_stopped(component, "ended");
            },
            Observation::EngineStopped {
                component,
                position,
                error: Some(error),
            } => {
                tracing::error!(component, %position, %error, "Engine failed");
                EngineMetrics::record_stopped(component, error.kind());
            },
            Observation::Recovered {
                component,
                position,
                replayed,
            } => {
                tracing::info!(component, %position, replayed, "Recovered from journal");
                PersistenceMetrics::record_recovered(component, replayed);
            },
            Observation::Persisted {
                component,
                position,
            } => {
                tracing::trace!(component, %position, "Change appended");
                PersistenceMetrics::record_append(component);
            },
            Observation::Compacted {
                component,
                position,
            } => {
                tracing::debug!(component, %position, "Journal compacted");
                PersistenceMetrics::record_compaction(component);
            },
            Observation::PersistenceFailed {
                component,
                position,
                error,
            } => {
                tracing::error!(component, %position, %error, "Journal write failed");
                PersistenceMetrics::record_failure(component);
            },
        }
    }
}
