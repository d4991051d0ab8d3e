//! # Streamfold Core
//!
//! Core traits and types for the Streamfold event-sourcing engine.
//!
//! A single ordered source of events drives one authoritative state through a
//! pure fold function; every transition is broadcast to any number of
//! independently paced subscribers. This crate holds the pure part of that
//! picture. The concurrency machinery lives in `streamfold-runtime`.
//!
//! ## Core Concepts
//!
//! - **Event**: opaque input, totally ordered by its source
//! - **State**: the authoritative value, owned by exactly one engine
//! - **Reducer**: `(state, event) → state`, optionally selecting derived
//!   outputs on statically declared channels
//! - **Change**: `{position, previous, event, state}`, produced once per event
//! - **Journal**: snapshot + append-only log used for recovery
//! - **Observer**: injectable hook receiving structured observations
//!
//! ## Example
//!
//! ```
//! use streamfold_core::{reducer_fn, Reducer};
//!
//! let counter = reducer_fn(|count: &mut u64, step: &u64| {
//!     *count += step;
//!     Ok(())
//! });
//!
//! let mut state = 0;
//! for event in [1, 1, 1] {
//!     counter.reduce(&mut state, &event).unwrap();
//! }
//! assert_eq!(state, 3);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Change records published by engines
pub mod change;

/// Error taxonomy shared by all components
pub mod error;

/// Snapshot + log persistence contract
pub mod journal;

/// Injectable observability hook
pub mod observe;

/// Log positions
pub mod position;

/// Fold functions and derived-output channels
pub mod reducer;

pub use change::Change;
pub use error::{ReduceError, StreamError};
pub use journal::{Journal, JournalContents, JournalFuture, LogEntry, PersistenceError, Snapshot};
pub use observe::{NoopObserver, Observation, Observer};
pub use position::Position;
pub use reducer::{Channel, Derived, Emitter, FnReducer, Reducer, SplitReducer, reducer_fn};
