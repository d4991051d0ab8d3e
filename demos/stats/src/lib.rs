//! # Stats Example
//!
//! Running statistics over random samples, persisted to a journal directory
//! so that a restarted process carries on from where the last one stopped.
//!
//! ## Configuration
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `STREAMFOLD_EVENTS` | samples to generate this run | 50 |
//! | `STREAMFOLD_SNAPSHOT_EVERY` | changes between snapshots | 10 |
//! | `STREAMFOLD_DATA_DIR` | journal directory | `stats-data` |

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use streamfold_core::{ReduceError, Reducer, StreamError};
use streamfold_runtime::{BridgeReceiver, ConfigError, adapt};

/// Environment variable holding the number of samples per run.
pub const EVENTS_VAR: &str = "STREAMFOLD_EVENTS";

/// Running statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Samples seen
    pub count: u64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Mean of all samples
    pub average: f64,
}

/// Folds samples into [`Stats`]. Rejects non-finite samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsReducer;

impl Reducer for StatsReducer {
    type State = Stats;
    type Event = f64;

    #[allow(clippy::cast_precision_loss)] // Counts stay far below 2^52
    fn reduce(&self, stats: &mut Stats, sample: &f64) -> Result<(), ReduceError> {
        if !sample.is_finite() {
            return Err(ReduceError::new(format!("sample {sample} is not finite")));
        }

        if stats.count == 0 {
            *stats = Stats {
                count: 1,
                min: *sample,
                max: *sample,
                average: *sample,
            };
            return Ok(());
        }

        let count = stats.count as f64;
        stats.average = stats.average.mul_add(count, *sample) / (count + 1.0);
        stats.min = stats.min.min(*sample);
        stats.max = stats.max.max(*sample);
        stats.count += 1;
        Ok(())
    }
}

/// Per-run settings read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSettings {
    /// Samples to generate
    pub events: u64,
    /// Pause between samples
    pub period: Duration,
}

impl StatsSettings {
    /// Default samples per run.
    pub const DEFAULT_EVENTS: u64 = 50;

    /// Read [`EVENTS_VAR`], falling back to [`DEFAULT_EVENTS`](Self::DEFAULT_EVENTS).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the variable is not an integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(std::env::var(EVENTS_VAR).ok().as_deref())
    }

    fn parse(events: Option<&str>) -> Result<Self, ConfigError> {
        let events = match events {
            None => Self::DEFAULT_EVENTS,
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: EVENTS_VAR,
                value: value.to_string(),
            })?,
        };
        Ok(Self {
            events,
            period: Duration::from_millis(200),
        })
    }
}

/// A producer of `count` uniform samples in `[0, 1)`, one per `period`.
///
/// A fixed `seed` makes the sequence reproducible.
#[must_use]
pub fn samples(count: u64, period: Duration, seed: Option<u64>) -> BridgeReceiver<f64> {
    adapt(move |sender| async move {
        let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        for _ in 0..count {
            sender
                .send(rng.r#gen::<f64>())
                .await
                .map_err(StreamError::upstream)?;
            if !period.is_zero() {
                tokio::time::sleep(period).await;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use streamfold_testing::FoldTest;

    #[test]
    fn first_sample_sets_everything() {
        FoldTest::new(StatsReducer)
            .given_state(Stats::default())
            .when_event(0.25)
            .then_state(|stats| {
                assert_eq!(
                    *stats,
                    Stats {
                        count: 1,
                        min: 0.25,
                        max: 0.25,
                        average: 0.25,
                    }
                );
            })
            .run();
    }

    #[test]
    fn later_samples_update_the_running_figures() {
        FoldTest::new(StatsReducer)
            .given_state(Stats::default())
            .when_events([0.5, 0.25, 0.75])
            .then_state(|stats| {
                assert_eq!(stats.count, 3);
                assert_eq!(stats.min, 0.25);
                assert_eq!(stats.max, 0.75);
                assert!((stats.average - 0.5).abs() < 1e-12);
            })
            .run();
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        FoldTest::new(StatsReducer)
            .given_state(Stats::default())
            .when_events([0.5, f64::NAN])
            .then_error(|error| assert!(error.message().contains("not finite")))
            .then_state(|stats| assert_eq!(stats.count, 1))
            .run();
    }

    #[test]
    fn settings_parse_the_event_count() {
        assert_eq!(StatsSettings::parse(None).unwrap().events, 50);
        assert_eq!(StatsSettings::parse(Some(" 7 ")).unwrap().events, 7);
        assert_eq!(
            StatsSettings::parse(Some("many")),
            Err(ConfigError::Invalid {
                var: EVENTS_VAR,
                value: "many".to_string(),
            })
        );
    }
}
