//! Recovery and write-back around an engine.
//!
//! [`recover`] folds a journal's snapshot and log into a starting state.
//! [`PersistentEngine`] wraps an [`Engine`]: it recovers, resumes the engine
//! from the recovered state, and subscribes a writer that appends every change
//! to the journal and periodically compacts it.
//!
//! # Failure isolation
//!
//! The writer is an ordinary subscriber. A journal error stops the writer and
//! removes its subscription; the engine and every other subscriber carry on.
//! The error is reported through the observer and through
//! [`PersistenceHandle::finished`].
//!
//! # Compaction
//!
//! Once `compaction_interval` log entries sit past the last snapshot (counting
//! entries recovered at startup) the writer saves a snapshot of the latest
//! state at its position, then truncates the log through that position. A
//! crash between the two steps is harmless: recovery skips log entries the
//! snapshot already subsumes.

use crate::broadcast::Subscription;
use crate::config::PersistenceConfig;
use crate::engine::{Engine, EngineSubscription, SharedChange};
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use streamfold_core::{
    Emitter, Journal, JournalContents, Observation, Observer, PersistenceError, Position,
    ReduceError, Reducer, Snapshot, SplitReducer, StreamError,
};
use tokio::sync::watch;
use tracing::Instrument;

/// A state rebuilt from a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered<S> {
    /// The folded state
    pub state: S,
    /// Position of the last event folded into `state`
    pub position: Position,
    /// Log entries folded on top of the snapshot
    pub replayed: usize,
    /// Log entries skipped because the snapshot already covered them
    pub skipped: usize,
}

/// Fold journal contents into a state.
///
/// Starts from the snapshot if there is one, otherwise from `initial` at
/// position 0. Log entries at or before the starting position are skipped;
/// the rest must follow on without gaps.
///
/// # Errors
///
/// - [`PersistenceError::Gap`] if a log position is missing
/// - [`PersistenceError::Replay`] if `fold` rejects a recorded event
pub fn recover<S, E, F>(
    contents: JournalContents<S, E>,
    initial: S,
    mut fold: F,
) -> Result<Recovered<S>, PersistenceError>
where
    F: FnMut(&mut S, &E) -> Result<(), ReduceError>,
{
    let (mut state, mut position) = match contents.snapshot {
        Some(snapshot) => (snapshot.state, snapshot.position),
        None => (initial, Position::INITIAL),
    };
    let mut replayed = 0;
    let mut skipped = 0;

    for entry in contents.log {
        if entry.position <= position {
            skipped += 1;
            continue;
        }

        let expected = position.next();
        if entry.position != expected {
            return Err(PersistenceError::Gap {
                expected,
                found: entry.position,
            });
        }

        fold(&mut state, &entry.event).map_err(|error| PersistenceError::Replay {
            position: entry.position,
            reason: error.to_string(),
        })?;
        position = entry.position;
        replayed += 1;
    }

    Ok(Recovered {
        state,
        position,
        replayed,
        skipped,
    })
}

/// [`recover`] with a [`Reducer`].
///
/// # Errors
///
/// See [`recover`].
pub fn recover_with<R: Reducer>(
    contents: JournalContents<R::State, R::Event>,
    initial: R::State,
    reducer: &R,
) -> Result<Recovered<R::State>, PersistenceError> {
    recover(contents, initial, |state, event| reducer.reduce(state, event))
}

/// [`recover`] with a [`SplitReducer`].
///
/// Outputs are discarded: catching up publishes nothing.
///
/// # Errors
///
/// See [`recover`].
pub fn recover_split<R: SplitReducer>(
    contents: JournalContents<R::State, R::Event>,
    initial: R::State,
    reducer: &R,
) -> Result<Recovered<R::State>, PersistenceError> {
    recover(contents, initial, |state, event| {
        reducer.reduce(state, event, &mut Emitter::muted())
    })
}

/// Progress of the journal writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterStatus {
    /// Appending changes
    Running {
        /// Last position made durable
        persisted: Position,
    },
    /// The engine ended and every change was written
    Ended {
        /// Last position made durable
        persisted: Position,
    },
    /// Writing stopped on an error
    Failed {
        /// Last position made durable
        persisted: Position,
        /// A journal error, or the engine's own failure
        error: StreamError,
    },
}

impl WriterStatus {
    /// Last position made durable.
    #[must_use]
    pub const fn persisted(&self) -> Position {
        match self {
            Self::Running { persisted }
            | Self::Ended { persisted }
            | Self::Failed { persisted, .. } => *persisted,
        }
    }

    /// Whether the writer has stopped.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Running { .. })
    }
}

/// Observes the journal writer.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    status: watch::Receiver<WriterStatus>,
}

impl PersistenceHandle {
    /// Current writer status.
    #[must_use]
    pub fn status(&self) -> WriterStatus {
        self.status.borrow().clone()
    }

    /// Last position made durable.
    #[must_use]
    pub fn persisted(&self) -> Position {
        self.status.borrow().persisted()
    }

    /// Wait for the writer to stop.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Persistence`] if a journal write failed, or the
    /// engine's error if the engine failed.
    pub async fn finished(&self) -> Result<Position, StreamError> {
        let mut status = self.status.clone();
        let finished = match status.wait_for(WriterStatus::is_finished).await {
            Ok(finished) => finished.clone(),
            Err(_) => self.status(),
        };
        match finished {
            WriterStatus::Failed { error, .. } => Err(error),
            other => Ok(other.persisted()),
        }
    }
}

struct Writer<J> {
    journal: J,
    config: PersistenceConfig,
    label: String,
    status: watch::Sender<WriterStatus>,
}

impl<J> Writer<J> {
    fn observer(&self) -> &Arc<dyn Observer> {
        &self.config.engine.observer
    }

    /// `since_snapshot` counts log entries already past the last snapshot.
    async fn run<S, E>(
        self,
        mut changes: Subscription<SharedChange<S, E>>,
        mut persisted: Position,
        mut since_snapshot: u64,
    ) where
        S: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        J: Journal<S, E>,
    {
        while let Some(next) = changes.next().await {
            let change = match next {
                Ok(change) => change,
                Err(error) => {
                    self.status.send_replace(WriterStatus::Failed { persisted, error });
                    return;
                },
            };

            let position = change.position;
            let written = self
                .journal
                .append(position, change.state.clone(), change.event.clone())
                .await;
            if let Err(error) = written {
                return self.abandon(changes, persisted, position, &error);
            }
            persisted = position;
            since_snapshot += 1;
            self.observer().observe(Observation::Persisted {
                component: &self.label,
                position,
            });

            if self.config.compaction_due(since_snapshot) {
                if let Err(error) = self.compact::<S, E>(change.state.clone(), position).await {
                    return self.abandon(changes, persisted, position, &error);
                }
                since_snapshot = 0;
            }

            self.status.send_replace(WriterStatus::Running { persisted });
        }

        self.status.send_replace(WriterStatus::Ended { persisted });
    }

    async fn compact<S, E>(&self, state: S, position: Position) -> Result<(), PersistenceError>
    where
        J: Journal<S, E>,
    {
        self.journal.save_snapshot(Snapshot::new(state, position)).await?;
        self.journal.truncate(position).await?;
        self.observer().observe(Observation::Compacted {
            component: &self.label,
            position,
        });
        Ok(())
    }

    /// Leave the engine without disturbing it and report the error.
    fn abandon<T>(
        &self,
        changes: Subscription<T>,
        persisted: Position,
        position: Position,
        error: &PersistenceError,
    ) {
        self.observer().observe(Observation::PersistenceFailed {
            component: &self.label,
            position,
            error,
        });
        changes.unsubscribe();
        self.status.send_replace(WriterStatus::Failed {
            persisted,
            error: error.clone().into(),
        });
    }
}

/// An engine whose changes are written back to a journal.
pub struct PersistentEngine<R: Reducer> {
    engine: Engine<R>,
    writer: PersistenceHandle,
}

impl<R: Reducer> PersistentEngine<R> {
    /// Recover from `journal`, then start folding `input`.
    ///
    /// The writer is subscribed before the first event is pulled, so every
    /// change after the recovered position reaches the journal.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the journal cannot be read or replayed.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    #[tracing::instrument(skip_all, name = "persistent_engine_open", fields(label = %config.engine.label))]
    pub async fn open<J, St>(
        journal: J,
        initial: R::State,
        reducer: R,
        input: St,
        config: PersistenceConfig,
    ) -> Result<Self, PersistenceError>
    where
        J: Journal<R::State, R::Event> + 'static,
        St: Stream<Item = Result<R::Event, StreamError>> + Send + 'static,
    {
        let contents = journal.read().await?;
        let recovered = recover_with(contents, initial, &reducer)?;

        let label = format!("{}.journal", config.engine.label);
        config.engine.observer.observe(Observation::Recovered {
            component: &label,
            position: recovered.position,
            replayed: recovered.replayed,
        });

        let engine = Engine::resume(recovered.state, recovered.position, reducer, config.engine.clone());
        let feed = engine.subscribe();

        let (status, watcher) = watch::channel(WriterStatus::Running {
            persisted: recovered.position,
        });
        let span = tracing::info_span!("journal_writer", label = %label);
        let writer = Writer {
            journal,
            config,
            label,
            status,
        };
        let since_snapshot = recovered.replayed as u64;
        tokio::spawn(
            writer
                .run(feed.changes, recovered.position, since_snapshot)
                .instrument(span),
        );

        engine
            .start(input)
            .map_err(|error| PersistenceError::Unavailable(error.to_string()))?;

        Ok(Self {
            engine,
            writer: PersistenceHandle { status: watcher },
        })
    }

    /// The wrapped engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine<R> {
        &self.engine
    }

    /// Current state plus the stream of every later change.
    #[must_use]
    pub fn subscribe(&self) -> EngineSubscription<R::State, R::Event> {
        self.engine.subscribe()
    }

    /// The journal writer.
    #[must_use]
    pub const fn writer(&self) -> &PersistenceHandle {
        &self.writer
    }

    /// Split into the engine and the writer handle.
    #[must_use]
    pub fn into_parts(self) -> (Engine<R>, PersistenceHandle) {
        (self.engine, self.writer)
    }
}

impl<R: Reducer> std::fmt::Debug for PersistentEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentEngine")
            .field("engine", &self.engine)
            .field("writer", &self.writer.status())
            .finish()
    }
}
