//! Snapshot + JSON-lines journal on the local file system.
//!
//! A journal directory holds two files:
//!
//! - `snapshot.json`: the latest [`Snapshot`], pretty-printed
//! - `events.jsonl`: one [`LogEntry`] per line, appended in position order
//!
//! Snapshots and truncations replace their file by writing a sibling `.tmp`
//! file, syncing it, renaming it over the original and syncing the directory,
//! so a crash leaves either the old or the new file and never a torn one. An
//! append interrupted by a crash can leave a partial last line; [`FileJournal::open`]
//! cuts it off.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use streamfold_core::{
    Journal, JournalContents, JournalFuture, LogEntry, PersistenceError, Position, Snapshot,
};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Environment variable naming the journal directory.
pub const DATA_DIR_VAR: &str = "STREAMFOLD_DATA_DIR";

/// Name of the snapshot file inside the journal directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Name of the log file inside the journal directory.
pub const LOG_FILE: &str = "events.jsonl";

fn io_error(path: &Path, error: &io::Error) -> PersistenceError {
    PersistenceError::Io(format!("{}: {error}", path.display()))
}

fn data_dir(var: Option<OsString>, default: PathBuf) -> PathBuf {
    match var {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => default,
    }
}

/// Only the position of a log line; the rest is kept as raw text.
#[derive(Deserialize)]
struct LinePosition {
    position: Position,
}

/// A [`Journal`] stored as files in one directory.
///
/// Operations on one `FileJournal` are serialized. Two journals must not
/// share a directory.
///
/// # Example
///
/// ```no_run
/// use streamfold_core::Journal;
/// use streamfold_file::FileJournal;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let journal = FileJournal::<u64, u64>::from_env("./data").await?;
/// let contents = journal.read().await?;
/// println!("{} log entries", contents.log.len());
/// # Ok(())
/// # }
/// ```
pub struct FileJournal<S, E> {
    dir: PathBuf,
    io: Mutex<()>,
    _phantom: PhantomData<fn() -> (S, E)>,
}

impl<S, E> FileJournal<S, E> {
    /// Open (creating if needed) a journal in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] if the directory cannot be created or
    /// a torn log tail cannot be repaired.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|error| io_error(&dir, &error))?;

        let journal = Self {
            dir,
            io: Mutex::new(()),
            _phantom: PhantomData,
        };
        journal.repair_log().await?;
        tracing::debug!(dir = %journal.dir.display(), "Opened file journal");
        Ok(journal)
    }

    /// Open the journal in `$STREAMFOLD_DATA_DIR`, or in `default_dir` when
    /// the variable is unset or empty.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn from_env(default_dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        Self::open(data_dir(std::env::var_os(DATA_DIR_VAR), default_dir.into())).await
    }

    /// The journal directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Cut a partial last line left by a crash mid-append.
    async fn repair_log(&self) -> Result<(), PersistenceError> {
        let path = self.log_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(io_error(&path, &error)),
        };
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = bytes.len() - keep,
            "Discarding torn log tail"
        );

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|error| io_error(&path, &error))?;
        file.set_len(keep as u64)
            .await
            .map_err(|error| io_error(&path, &error))?;
        file.sync_all().await.map_err(|error| io_error(&path, &error))
    }

    /// Raw log text; empty when the file does not exist.
    async fn read_log_text(&self) -> Result<String, PersistenceError> {
        let path = self.log_path();
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(error) => Err(io_error(&path, &error)),
        }
    }

    /// Atomically replace `path` with `contents`.
    async fn replace_file(&self, path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
        let staging = path.with_extension("tmp");
        let mut file = fs::File::create(&staging)
            .await
            .map_err(|error| io_error(&staging, &error))?;
        file.write_all(contents)
            .await
            .map_err(|error| io_error(&staging, &error))?;
        file.sync_all()
            .await
            .map_err(|error| io_error(&staging, &error))?;
        drop(file);

        fs::rename(&staging, path)
            .await
            .map_err(|error| io_error(path, &error))?;
        sync_dir(&self.dir).await
    }
}

impl<S, E> FileJournal<S, E>
where
    S: DeserializeOwned,
    E: DeserializeOwned,
{
    async fn read_snapshot(&self) -> Result<Option<Snapshot<S>>, PersistenceError> {
        let path = self.snapshot_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error(&path, &error)),
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            PersistenceError::Serialization(format!("{}: {error}", path.display()))
        })
    }

    async fn read_log(&self) -> Result<Vec<LogEntry<E>>, PersistenceError> {
        let text = self.read_log_text().await?;
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|error| {
                    PersistenceError::Serialization(format!(
                        "{}:{}: {error}",
                        self.log_path().display(),
                        index + 1
                    ))
                })
            })
            .collect()
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), PersistenceError> {
    let handle = fs::File::open(dir)
        .await
        .map_err(|error| io_error(dir, &error))?;
    handle.sync_all().await.map_err(|error| io_error(dir, &error))
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn sync_dir(_dir: &Path) -> Result<(), PersistenceError> {
    Ok(())
}

impl<S, E> fmt::Debug for FileJournal<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileJournal")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl<S, E> Journal<S, E> for FileJournal<S, E>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn read(&self) -> JournalFuture<'_, JournalContents<S, E>> {
        Box::pin(async move {
            let _io = self.io.lock().await;
            let snapshot = self.read_snapshot().await?;
            let log = self.read_log().await?;
            tracing::debug!(
                snapshot = ?snapshot.as_ref().map(|s| s.position),
                log_entries = log.len(),
                "Read file journal"
            );
            Ok(JournalContents { snapshot, log })
        })
    }

    fn append(&self, position: Position, _state: S, event: E) -> JournalFuture<'_, ()> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(&LogEntry::new(position, event))
                .map_err(|error| PersistenceError::Serialization(error.to_string()))?;
            line.push(b'\n');

            let _io = self.io.lock().await;
            let path = self.log_path();
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|error| io_error(&path, &error))?;
            file.write_all(&line)
                .await
                .map_err(|error| io_error(&path, &error))?;
            file.sync_data()
                .await
                .map_err(|error| io_error(&path, &error))?;

            tracing::trace!(%position, "Appended log entry");
            Ok(())
        })
    }

    fn save_snapshot(&self, snapshot: Snapshot<S>) -> JournalFuture<'_, ()> {
        Box::pin(async move {
            let bytes = serde_json::to_vec_pretty(&snapshot)
                .map_err(|error| PersistenceError::Serialization(error.to_string()))?;

            let _io = self.io.lock().await;
            self.replace_file(&self.snapshot_path(), &bytes).await?;
            tracing::debug!(position = %snapshot.position, "Saved snapshot");
            Ok(())
        })
    }

    fn truncate(&self, through: Position) -> JournalFuture<'_, ()> {
        Box::pin(async move {
            let _io = self.io.lock().await;
            let text = self.read_log_text().await?;

            let mut kept = String::with_capacity(text.len());
            let mut dropped = 0_usize;
            for line in text.lines().filter(|line| !line.trim().is_empty()) {
                let LinePosition { position } = serde_json::from_str(line)
                    .map_err(|error| PersistenceError::Serialization(error.to_string()))?;
                if position > through {
                    kept.push_str(line);
                    kept.push('\n');
                } else {
                    dropped += 1;
                }
            }

            self.replace_file(&self.log_path(), kept.as_bytes()).await?;
            tracing::debug!(%through, dropped, "Truncated log");
            Ok(())
        })
    }
}
