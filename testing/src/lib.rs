//! # Streamfold Testing
//!
//! Testing utilities and helpers for Streamfold engines.
//!
//! This crate provides:
//! - [`InMemoryJournal`]: cloneable journal with fault injection
//! - [`RecordingObserver`]: captures observations for assertions
//! - [`FoldTest`] / [`SplitFoldTest`]: Given-When-Then reducer tests
//! - Stream helpers for driving and draining engines
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use streamfold_core::reducer_fn;
//! use streamfold_runtime::Engine;
//! use streamfold_testing::helpers::{drain, events, recording_config};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (config, observer) = recording_config("counter");
//! let engine = Engine::with_config(0_u32, reducer_fn(|n: &mut u32, _: &()| {
//!     *n += 1;
//!     Ok(())
//! }), config);
//!
//! let feed = engine.subscribe();
//! engine.start(events([(), ()])).ok();
//!
//! let (changes, error) = drain(feed.changes).await;
//! assert_eq!(changes.len(), 2);
//! assert!(error.is_none());
//! assert!(!observer.records().is_empty());
//! # }
//! ```


/// In-memory journal
pub mod journal_mocks;

/// Recording observer
pub mod observer;

/// Test helpers and utilities
pub mod helpers {
    use crate::observer::RecordingObserver;
    use futures::stream::{self, Stream, StreamExt};
    use std::sync::Arc;
    use streamfold_core::{NoopObserver, StreamError};
    use streamfold_runtime::EngineConfig;

    /// An input stream yielding `items` and then ending.
    pub fn events<T>(
        items: impl IntoIterator<Item = T>,
    ) -> impl Stream<Item = Result<T, StreamError>> + Send + 'static
    where
        T: Send + 'static,
    {
        let items: Vec<T> = items.into_iter().collect();
        stream::iter(items.into_iter().map(Ok))
    }

    /// An input stream yielding `items` and then failing with `error`.
    pub fn events_then_error<T>(
        items: impl IntoIterator<Item = T>,
        error: StreamError,
    ) -> impl Stream<Item = Result<T, StreamError>> + Send + 'static
    where
        T: Send + 'static,
    {
        let items: Vec<T> = items.into_iter().collect();
        async_stream::stream! {
            for item in items {
                yield Ok(item);
            }
            yield Err(error);
        }
    }

    /// Consume a subscription to its end.
    ///
    /// Returns the delivered items and the terminal error, if any.
    pub async fn drain<T, St>(subscription: St) -> (Vec<T>, Option<StreamError>)
    where
        St: Stream<Item = Result<T, StreamError>>,
    {
        let mut subscription = std::pin::pin!(subscription);
        let mut items = Vec::new();
        while let Some(next) = subscription.next().await {
            match next {
                Ok(item) => items.push(item),
                Err(error) => return (items, Some(error)),
            }
        }
        (items, None)
    }

    /// Engine config that discards observations.
    #[must_use]
    pub fn quiet_config(label: &str) -> EngineConfig {
        EngineConfig::default()
            .with_label(label)
            .with_observer(Arc::new(NoopObserver))
    }

    /// Engine config wired to a fresh [`RecordingObserver`].
    #[must_use]
    pub fn recording_config(label: &str) -> (EngineConfig, RecordingObserver) {
        let observer = RecordingObserver::new();
        let config = EngineConfig::default()
            .with_label(label)
            .with_observer(Arc::new(observer.clone()));
        (config, observer)
    }

    /// Install a test-friendly tracing subscriber (honours `RUST_LOG`).
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_test_tracing() {
        use tracing_subscriber::EnvFilter;

        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::collection::vec;
    use proptest::prelude::*;

    /// Short sequences of small signed steps.
    pub fn steps(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
        vec(-100_i64..100, 0..max_len)
    }

    /// A step sequence plus a cut point within it (inclusive of both ends).
    pub fn steps_with_cut(max_len: usize) -> impl Strategy<Value = (Vec<i64>, usize)> {
        steps(max_len).prop_flat_map(|steps| {
            let len = steps.len();
            (Just(steps), 0..=len)
        })
    }
}

// Re-export commonly used items
pub use fold_test::{FoldTest, SplitFoldTest};
pub use journal_mocks::InMemoryJournal;
pub use observer::{Recorded, RecordingObserver};
