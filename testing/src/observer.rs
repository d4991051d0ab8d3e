//! Observer that records observations for assertions

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};
use streamfold_core::{Observation, Observer, PersistenceError, Position, StreamError};

/// Owned copy of an [`Observation`].
///
/// Round timings are dropped so records compare deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)] // Mirrors `Observation` field for field
pub enum Recorded {
    Subscribed { component: String, subscribers: usize },
    Unsubscribed { component: String, subscribers: usize },
    Published { component: String, subscribers: usize },
    Terminated { component: String, error: Option<StreamError>, subscribers: usize },
    Reduced { component: String, position: Position },
    EngineStopped { component: String, position: Position, error: Option<StreamError> },
    Recovered { component: String, position: Position, replayed: usize },
    Persisted { component: String, position: Position },
    Compacted { component: String, position: Position },
    PersistenceFailed { component: String, position: Position, error: PersistenceError },
}

impl Recorded {
    /// Label of the component that reported this
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::Subscribed { component, .. }
            | Self::Unsubscribed { component, .. }
            | Self::Published { component, .. }
            | Self::Terminated { component, .. }
            | Self::Reduced { component, .. }
            | Self::EngineStopped { component, .. }
            | Self::Recovered { component, .. }
            | Self::Persisted { component, .. }
            | Self::Compacted { component, .. }
            | Self::PersistenceFailed { component, .. } => component,
        }
    }
}

impl From<Observation<'_>> for Recorded {
    fn from(observation: Observation<'_>) -> Self {
        match observation {
            Observation::Subscribed { component, subscribers } => Self::Subscribed {
                component: component.to_string(),
                subscribers,
            },
            Observation::Unsubscribed { component, subscribers } => Self::Unsubscribed {
                component: component.to_string(),
                subscribers,
            },
            Observation::Published { component, subscribers, .. } => Self::Published {
                component: component.to_string(),
                subscribers,
            },
            Observation::Terminated { component, error, subscribers } => Self::Terminated {
                component: component.to_string(),
                error: error.cloned(),
                subscribers,
            },
            Observation::Reduced { component, position } => Self::Reduced {
                component: component.to_string(),
                position,
            },
            Observation::EngineStopped { component, position, error } => Self::EngineStopped {
                component: component.to_string(),
                position,
                error: error.cloned(),
            },
            Observation::Recovered { component, position, replayed } => Self::Recovered {
                component: component.to_string(),
                position,
                replayed,
            },
            Observation::Persisted { component, position } => Self::Persisted {
                component: component.to_string(),
                position,
            },
            Observation::Compacted { component, position } => Self::Compacted {
                component: component.to_string(),
                position,
            },
            Observation::PersistenceFailed { component, position, error } => {
                Self::PersistenceFailed {
                    component: component.to_string(),
                    position,
                    error: error.clone(),
                }
            },
        }
    }
}

/// Captures every observation in order. Clones share one record.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use streamfold_runtime::{Broadcaster, BroadcastConfig};
/// use streamfold_testing::{Recorded, RecordingObserver};
///
/// let observer = RecordingObserver::new();
/// let broadcaster = Broadcaster::<u8>::new(
///     BroadcastConfig::default()
///         .with_label("numbers")
///         .with_observer(Arc::new(observer.clone())),
/// );
/// let _subscription = broadcaster.subscribe();
///
/// assert_eq!(
///     observer.records(),
///     vec![Recorded::Subscribed { component: "numbers".to_string(), subscribers: 1 }]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    records: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far
    #[must_use]
    pub fn records(&self) -> Vec<Recorded> {
        self.records.lock().unwrap().clone()
    }

    /// Records matching a predicate
    #[must_use]
    pub fn matching(&self, predicate: impl Fn(&Recorded) -> bool) -> Vec<Recorded> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Number of records matching a predicate
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
        self.records.lock().unwrap().iter().filter(|r| predicate(r)).count()
    }

    /// Journal write failures recorded so far
    #[must_use]
    pub fn persistence_failures(&self) -> Vec<PersistenceError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|record| match record {
                Recorded::PersistenceFailed { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl Observer for RecordingObserver {
    fn observe(&self, observation: Observation<'_>) {
        self.records.lock().unwrap().push(observation.into());
    }
}
