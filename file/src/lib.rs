//! # Streamfold File
//!
//! A crash-safe, file-backed [`Journal`](streamfold_core::Journal) for
//! persistent engines.
//!
//! [`FileJournal`] keeps the latest snapshot as pretty-printed JSON and the
//! events after it as JSON lines. It is meant for single-process deployments
//! and demos; any serde-serializable state and event types work.
//!
//! ## Example
//!
//! ```no_run
//! use streamfold_core::reducer_fn;
//! use streamfold_file::FileJournal;
//! use streamfold_runtime::{EngineConfig, PersistenceConfig, PersistentEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let journal = FileJournal::<u64, u64>::from_env("./data").await?;
//! let config = PersistenceConfig::new(EngineConfig::default().with_label("totals"))
//!     .with_compaction_interval(100)
//!     .from_env()?;
//!
//! let sum = reducer_fn(|total: &mut u64, n: &u64| {
//!     *total += n;
//!     Ok(())
//! });
//! let persistent = PersistentEngine::open(
//!     journal,
//!     0,
//!     sum,
//!     futures::stream::iter([Ok(1), Ok(2)]),
//!     config,
//! )
//! .await?;
//! persistent.writer().finished().await?;
//! # Ok(())
//! # }
//! ```

pub mod journal;

pub use journal::{DATA_DIR_VAR, FileJournal, LOG_FILE, SNAPSHOT_FILE};
