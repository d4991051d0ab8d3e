//! Observability hook.
//!
//! Every runtime component takes an `Arc<dyn Observer>` through its config
//! and reports what it does as typed [`Observation`]s. The runtime's default
//! observer turns them into `tracing` events and `metrics` counters; tests
//! install a recording observer instead.

use crate::error::StreamError;
use crate::journal::PersistenceError;
use crate::position::Position;
use std::time::Duration;

/// Something a component did that an operator may care about.
#[derive(Debug, Clone, Copy)]
pub enum Observation<'a> {
    /// A subscriber joined a broadcaster.
    Subscribed {
        /// Broadcaster label
        component: &'a str,
        /// Registry size after the join
        subscribers: usize,
    },
    /// A subscriber left a broadcaster before its terminal signal.
    Unsubscribed {
        /// Broadcaster label
        component: &'a str,
        /// Registry size after the departure
        subscribers: usize,
    },
    /// One publish round finished with every acknowledgment joined.
    Published {
        /// Broadcaster label
        component: &'a str,
        /// Subscribers the item was delivered to
        subscribers: usize,
        /// Time from the registry snapshot to the last acknowledgment
        elapsed: Duration,
    },
    /// A broadcaster emitted its terminal signal.
    Terminated {
        /// Broadcaster label
        component: &'a str,
        /// `None` for graceful end
        error: Option<&'a StreamError>,
        /// Subscribers that received the signal
        subscribers: usize,
    },
    /// An engine folded an event.
    Reduced {
        /// Engine label
        component: &'a str,
        /// Position of the folded event
        position: Position,
    },
    /// An engine stopped accepting input.
    EngineStopped {
        /// Engine label
        component: &'a str,
        /// Position of the last folded event
        position: Position,
        /// `None` for graceful end
        error: Option<&'a StreamError>,
    },
    /// Recovery folded the journal before the engine started.
    Recovered {
        /// Façade label
        component: &'a str,
        /// Position reached by recovery
        position: Position,
        /// Log entries replayed on top of the snapshot
        replayed: usize,
    },
    /// The façade appended a change to the log.
    Persisted {
        /// Façade label
        component: &'a str,
        /// Position written
        position: Position,
    },
    /// The façade saved a snapshot and truncated the log.
    Compacted {
        /// Façade label
        component: &'a str,
        /// Snapshot position
        position: Position,
    },
    /// A journal write failed; the façade's subscription is terminated.
    PersistenceFailed {
        /// Façade label
        component: &'a str,
        /// Position being written
        position: Position,
        /// The journal's error
        error: &'a PersistenceError,
    },
}

/// Receives [`Observation`]s from runtime components.
pub trait Observer: Send + Sync {
    /// Handle one observation. Must not block.
    fn observe(&self, observation: Observation<'_>);
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn observe(&self, _observation: Observation<'_>) {}
}
