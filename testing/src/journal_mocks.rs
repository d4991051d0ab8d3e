//! In-memory journal for fast, deterministic persistence tests
//!
//! [`InMemoryJournal`] is cloneable: clones share one storage, so a test can
//! hand one clone to a persistent engine and inspect another, or "restart" by
//! opening a second engine over the same storage. Faults can be injected to
//! exercise failure isolation and crash windows.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use std::fmt;
use std::sync::{Arc, RwLock};
use streamfold_core::{
    Journal, JournalContents, JournalFuture, LogEntry, PersistenceError, Position, Snapshot,
};

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_reads: bool,
    fail_appends_after: Option<usize>,
    fail_snapshots: bool,
    fail_truncates: bool,
}

struct Storage<S, E> {
    snapshot: Option<Snapshot<S>>,
    log: Vec<LogEntry<E>>,
    appends: usize,
    snapshots: usize,
    faults: Faults,
}

/// Snapshot + log kept in memory.
///
/// # Example
///
/// ```
/// use streamfold_core::{Journal, Position};
/// use streamfold_testing::InMemoryJournal;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let journal = InMemoryJournal::<u64, u64>::new();
/// journal.append(Position::new(1), 5, 5).await?;
///
/// let contents = journal.read().await?;
/// assert_eq!(contents.log.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct InMemoryJournal<S, E> {
    storage: Arc<RwLock<Storage<S, E>>>,
}

impl<S, E> InMemoryJournal<S, E> {
    /// Create an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::with_contents(JournalContents::empty())
    }

    /// Create a journal holding `contents`
    ///
    /// Useful for staging crash leftovers, such as a snapshot next to log
    /// entries it already covers.
    #[must_use]
    pub fn with_contents(contents: JournalContents<S, E>) -> Self {
        Self {
            storage: Arc::new(RwLock::new(Storage {
                snapshot: contents.snapshot,
                log: contents.log,
                appends: 0,
                snapshots: 0,
                faults: Faults::default(),
            })),
        }
    }

    /// Positions currently in the log
    #[must_use]
    pub fn log_positions(&self) -> Vec<Position> {
        self.storage.read().unwrap().log.iter().map(|e| e.position).collect()
    }

    /// Position of the stored snapshot
    #[must_use]
    pub fn snapshot_position(&self) -> Option<Position> {
        self.storage.read().unwrap().snapshot.as_ref().map(|s| s.position)
    }

    /// Number of successful appends since creation
    #[must_use]
    pub fn append_count(&self) -> usize {
        self.storage.read().unwrap().appends
    }

    /// Number of successful snapshot saves since creation
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.storage.read().unwrap().snapshots
    }

    /// Make `read` fail
    pub fn fail_reads(&self) {
        self.storage.write().unwrap().faults.fail_reads = true;
    }

    /// Let `successful` more appends through, then fail every later one
    pub fn fail_appends_after(&self, successful: usize) {
        let mut storage = self.storage.write().unwrap();
        storage.faults.fail_appends_after = Some(storage.appends + successful);
    }

    /// Make `save_snapshot` fail
    pub fn fail_snapshots(&self) {
        self.storage.write().unwrap().faults.fail_snapshots = true;
    }

    /// Make `truncate` fail, simulating a crash between snapshot and truncate
    pub fn fail_truncates(&self) {
        self.storage.write().unwrap().faults.fail_truncates = true;
    }

    /// Clear every injected fault
    pub fn heal(&self) {
        self.storage.write().unwrap().faults = Faults::default();
    }
}

impl<S: Clone, E: Clone> InMemoryJournal<S, E> {
    /// Copy of everything stored
    #[must_use]
    pub fn contents(&self) -> JournalContents<S, E> {
        let storage = self.storage.read().unwrap();
        JournalContents {
            snapshot: storage.snapshot.clone(),
            log: storage.log.clone(),
        }
    }
}

impl<S, E> Clone for InMemoryJournal<S, E> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S, E> Default for InMemoryJournal<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> fmt::Debug for InMemoryJournal<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.storage.read().unwrap();
        f.debug_struct("InMemoryJournal")
            .field("snapshot", &storage.snapshot.as_ref().map(|s| s.position))
            .field("log_len", &storage.log.len())
            .field("faults", &storage.faults)
            .finish()
    }
}

impl<S, E> Journal<S, E> for InMemoryJournal<S, E>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn read(&self) -> JournalFuture<'_, JournalContents<S, E>> {
        Box::pin(async move {
            if self.storage.read().unwrap().faults.fail_reads {
                return Err(PersistenceError::Unavailable("injected read failure".to_string()));
            }
            Ok(self.contents())
        })
    }

    fn append(&self, position: Position, _state: S, event: E) -> JournalFuture<'_, ()> {
        Box::pin(async move {
            let mut storage = self.storage.write().unwrap();
            if storage
                .faults
                .fail_appends_after
                .is_some_and(|limit| storage.appends >= limit)
            {
                return Err(PersistenceError::Io(format!(
                    "injected append failure at position {position}"
                )));
            }
            storage.log.push(LogEntry::new(position, event));
            storage.appends += 1;
            Ok(())
        })
    }

    fn save_snapshot(&self, snapshot: Snapshot<S>) -> JournalFuture<'_, ()> {
        Box::pin(async move {
            let mut storage = self.storage.write().unwrap();
            if storage.faults.fail_snapshots {
                return Err(PersistenceError::Io("injected snapshot failure".to_string()));
            }
            storage.snapshot = Some(snapshot);
            storage.snapshots += 1;
            Ok(())
        })
    }

    fn truncate(&self, through: Position) -> JournalFuture<'_, ()> {
        Box::pin(async move {
            let mut storage = self.storage.write().unwrap();
            if storage.faults.fail_truncates {
                return Err(PersistenceError::Io("injected truncate failure".to_string()));
            }
            storage.log.retain(|entry| entry.position > through);
            Ok(())
        })
    }
}
