//! # Counter Example
//!
//! A counter folded from a timer, demonstrating subscribe-time stitching.
//!
//! A subscriber that joins while the engine is running receives the current
//! count first and then every later change, with nothing missed and nothing
//! repeated.
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterEvent, CounterReducer, CounterState};
//! use streamfold_runtime::Engine;
//!
//! # async fn example() {
//! let engine = Engine::new(CounterState::default(), CounterReducer);
//! let feed = engine.subscribe();
//! assert_eq!(feed.current_state.count, 0);
//! engine
//!     .start(futures::stream::iter([Ok(CounterEvent::Increment)]))
//!     .ok();
//! # }
//! ```

use std::time::Duration;
use streamfold_core::{ReduceError, Reducer, StreamError};
use streamfold_runtime::{BridgeReceiver, adapt};

/// Counter state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
}

/// Counter events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Reset the counter to 0
    Reset,
}

/// Counter reducer
///
/// Counts never go below zero; a decrement at zero is rejected and stops the
/// engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer;

impl Reducer for CounterReducer {
    type State = CounterState;
    type Event = CounterEvent;

    fn reduce(&self, state: &mut CounterState, event: &CounterEvent) -> Result<(), ReduceError> {
        match event {
            CounterEvent::Increment => state.count += 1,
            CounterEvent::Decrement if state.count == 0 => {
                return Err(ReduceError::new("count cannot go below zero"));
            },
            CounterEvent::Decrement => state.count -= 1,
            CounterEvent::Reset => state.count = 0,
        }
        Ok(())
    }
}

/// A producer that emits [`CounterEvent::Increment`] every `period`.
///
/// Stops after `ticks` increments, or runs until nobody consumes when `ticks`
/// is `None`. Each tick waits for the engine to take the previous one.
#[must_use]
pub fn ticker(period: Duration, ticks: Option<u64>) -> BridgeReceiver<CounterEvent> {
    adapt(move |sender| async move {
        let mut interval = tokio::time::interval(period);
        let mut sent = 0_u64;
        while ticks.is_none_or(|limit| sent < limit) {
            interval.tick().await;
            if sender.send(CounterEvent::Increment).await.is_err() {
                tracing::debug!(sent, "Ticker stopped: consumer gone");
                return Ok::<(), StreamError>(());
            }
            sent += 1;
        }
        Ok(())
    })
}
