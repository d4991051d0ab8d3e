//! Journal trait and related types for snapshot + log persistence.
//!
//! A journal is the durable collaborator behind the persistence façade. It
//! stores at most one snapshot and an append-only log of the events that came
//! after it.
//!
//! # Recovery contract
//!
//! Every snapshot carries the [`Position`] of the last event it subsumes and
//! every log entry carries its own position. Recovery skips log entries at or
//! before the snapshot position, so a crash between saving a snapshot and
//! truncating the log can never replay an event twice. Truncation is
//! therefore an optimisation, not a correctness step.
//!
//! # Example
//!
//! ```no_run
//! use streamfold_core::journal::{Journal, PersistenceError, Snapshot};
//! use streamfold_core::position::Position;
//!
//! async fn compact<J: Journal<u64, u64>>(
//!     journal: &J,
//!     state: u64,
//!     position: Position,
//! ) -> Result<(), PersistenceError> {
//!     journal.save_snapshot(Snapshot::new(state, position)).await?;
//!     journal.truncate(position).await
//! }
//! ```

use crate::error::StreamError;
use crate::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future returned by [`Journal`] operations.
pub type JournalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send + 'a>>;

/// Errors that can occur during journal operations and recovery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Storage I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A snapshot or log entry could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The log skips a position after the snapshot marker.
    #[error("Log gap: expected position {expected}, found {found}")]
    Gap {
        /// The position recovery needed next
        expected: Position,
        /// The position actually found
        found: Position,
    },

    /// Replaying a recorded event through the reducer failed.
    #[error("Replay failed at position {position}: {reason}")]
    Replay {
        /// Position of the event that failed to replay
        position: Position,
        /// The reducer's error message
        reason: String,
    },

    /// The collaborator refused the operation.
    #[error("Journal unavailable: {0}")]
    Unavailable(String),
}

impl From<PersistenceError> for StreamError {
    fn from(error: PersistenceError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// A persisted `(state, position)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// The folded state
    pub state: S,
    /// Position of the last event folded into `state`
    pub position: Position,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl<S> Snapshot<S> {
    /// Create a snapshot taken now.
    #[must_use]
    pub fn new(state: S, position: Position) -> Self {
        Self {
            state,
            position,
            taken_at: Utc::now(),
        }
    }
}

/// One recorded event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry<E> {
    /// Position of the event in the source
    pub position: Position,
    /// The event
    pub event: E,
}

impl<E> LogEntry<E> {
    /// Create a log entry.
    #[must_use]
    pub const fn new(position: Position, event: E) -> Self {
        Self { position, event }
    }
}

/// Everything a journal holds: an optional snapshot and the log.
///
/// The log may still contain entries the snapshot subsumes; see the module
/// documentation.
#[derive(Clone, Debug, PartialEq)]
pub struct JournalContents<S, E> {
    /// Latest snapshot, absent on cold start
    pub snapshot: Option<Snapshot<S>>,
    /// Recorded events in position order
    pub log: Vec<LogEntry<E>>,
}

impl<S, E> JournalContents<S, E> {
    /// Contents of a journal that has never been written.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            snapshot: None,
            log: Vec::new(),
        }
    }

    /// Whether there is nothing to recover.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.log.is_empty()
    }
}

/// Durable snapshot + log storage.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the façade drives them from its own
/// task.
///
/// # Dyn Compatibility
///
/// Operations return [`JournalFuture`] instead of using `async fn` so the
/// trait can be used as `Arc<dyn Journal<S, E>>`.
pub trait Journal<S, E>: Send + Sync {
    /// Read the snapshot (if any) and the log.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if storage cannot be read or decoded.
    fn read(&self) -> JournalFuture<'_, JournalContents<S, E>>;

    /// Durably append one processed change.
    ///
    /// Called exactly once per change by the façade, which never retries.
    /// Implementations receive the resulting state alongside the event and may
    /// store either or both.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    fn append(&self, position: Position, state: S, event: E) -> JournalFuture<'_, ()>;

    /// Durably replace the snapshot.
    ///
    /// Must be atomic: after a crash, recovery sees either the previous
    /// snapshot or this one, never a torn write.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    fn save_snapshot(&self, snapshot: Snapshot<S>) -> JournalFuture<'_, ()>;

    /// Remove log entries at or before `through`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the log cannot be rewritten.
    fn truncate(&self, through: Position) -> JournalFuture<'_, ()>;
}

impl<S, E, J> Journal<S, E> for Arc<J>
where
    J: Journal<S, E> + ?Sized,
{
    fn read(&self) -> JournalFuture<'_, JournalContents<S, E>> {
        (**self).read()
    }

    fn append(&self, position: Position, state: S, event: E) -> JournalFuture<'_, ()> {
        (**self).append(position, state, event)
    }

    fn save_snapshot(&self, snapshot: Snapshot<S>) -> JournalFuture<'_, ()> {
        (**self).save_snapshot(snapshot)
    }

    fn truncate(&self, through: Position) -> JournalFuture<'_, ()> {
        (**self).truncate(through)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_error_display() {
        let error = PersistenceError::Gap {
            expected: Position::new(5),
            found: Position::new(7),
        };

        let display = format!("{error}");
        assert!(display.contains("expected position 5"));
        assert!(display.contains("found 7"));
    }

    #[test]
    fn persistence_error_becomes_stream_error() {
        let error: StreamError = PersistenceError::Io("disk full".to_string()).into();
        assert_eq!(error, StreamError::Persistence("I/O error: disk full".to_string()));
    }

    #[test]
    fn empty_contents() {
        let contents: JournalContents<u8, u8> = JournalContents::empty();
        assert!(contents.is_empty());
    }
}
