//! The reactive engine: one authoritative state folded from one ordered input.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──▶ Running ──input ends──▶ Ended
//!                    │
//!                    └──input/reducer/delivery error──▶ Failed
//! ```
//!
//! A single worker task pulls one event, folds it, publishes the resulting
//! [`Change`] and waits for every subscriber to acknowledge before pulling
//! again. Backpressure therefore reaches all the way to the input.
//!
//! # Subscribing
//!
//! [`Engine::subscribe`] returns the state at the instant of the call together
//! with a change stream that starts exactly at the next event: nothing is
//! missed and nothing is seen twice. The worker updates the published state
//! and snapshots the subscriber registry under one lock, and `subscribe` reads
//! the state and registers under the same lock.
//!
//! # Resource exhaustion
//!
//! There are no timeouts. A subscriber that never comes back for its next
//! change stalls the engine and, through backpressure, its input. Bounding
//! subscriber latency is the caller's responsibility.

use crate::broadcast::{Broadcaster, PublishError, Subscription};
use crate::config::EngineConfig;
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use streamfold_core::{Change, Observation, Position, Reducer, StreamError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::Instrument;

/// Errors from engine control operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start` was called on an engine that already has an input.
    #[error("Engine already started")]
    AlreadyStarted,
}

/// Where an engine is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Constructed, no input yet
    Idle,
    /// Folding input
    Running,
    /// Input ended gracefully
    Ended,
    /// Input, reducer or delivery failed
    Failed(StreamError),
}

impl EngineStatus {
    /// Whether the engine has stopped for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed(_))
    }
}

/// Change records as carried by the engine's broadcaster.
pub type SharedChange<S, E> = Arc<Change<S, E>>;

/// Result of [`Engine::subscribe`].
pub struct EngineSubscription<S, E> {
    /// State after every event processed before the subscription
    pub current_state: S,
    /// Position of `current_state`
    pub position: Position,
    /// Changes from the next event on
    pub changes: Subscription<SharedChange<S, E>>,
}

impl<S: fmt::Debug, E> fmt::Debug for EngineSubscription<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSubscription")
            .field("current_state", &self.current_state)
            .field("position", &self.position)
            .field("changes", &self.changes)
            .finish()
    }
}

struct Published<S> {
    state: S,
    position: Position,
}

struct Shared<R: Reducer> {
    reducer: R,
    published: Mutex<Published<R::State>>,
    changes: Broadcaster<SharedChange<R::State, R::Event>>,
    status: watch::Sender<EngineStatus>,
    started: AtomicBool,
    config: EngineConfig,
}

impl<R: Reducer> Shared<R> {
    fn published(&self) -> MutexGuard<'_, Published<R::State>> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, position: Position, error: Option<StreamError>) {
        self.config.observer.observe(Observation::EngineStopped {
            component: &self.config.label,
            position,
            error: error.as_ref(),
        });
        match error {
            None => {
                self.changes.close();
                self.status.send_replace(EngineStatus::Ended);
            },
            Some(error) => {
                self.changes.fail(error.clone());
                self.status.send_replace(EngineStatus::Failed(error));
            },
        }
    }
}

/// A reactive fold over an ordered input. Cheap to clone.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use streamfold_core::reducer_fn;
/// use streamfold_runtime::bridge::bridge;
/// use streamfold_runtime::engine::Engine;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (input, events) = bridge::<u64>();
/// let engine = Engine::new(0_u64, reducer_fn(|total: &mut u64, n: &u64| {
///     *total += n;
///     Ok(())
/// }));
///
/// let mut feed = engine.subscribe();
/// assert_eq!(feed.current_state, 0);
/// engine.start(events).ok();
///
/// let producer = tokio::spawn(async move {
///     input.send(5).await.ok();
///     input.close();
/// });
///
/// let change = feed.changes.next().await.and_then(Result::ok);
/// assert_eq!(change.map(|c| c.state), Some(5));
/// producer.await.ok();
/// # }
/// ```
pub struct Engine<R: Reducer> {
    shared: Arc<Shared<R>>,
}

impl<R: Reducer> Clone for Engine<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Reducer> Engine<R> {
    /// Create an idle engine at position 0.
    #[must_use]
    pub fn new(initial: R::State, reducer: R) -> Self {
        Self::with_config(initial, reducer, EngineConfig::default())
    }

    /// Create an idle engine at position 0 with a custom config.
    #[must_use]
    pub fn with_config(initial: R::State, reducer: R, config: EngineConfig) -> Self {
        Self::resume(initial, Position::INITIAL, reducer, config)
    }

    /// Create an idle engine continuing from a recovered state.
    ///
    /// The first event folded gets position `position + 1`.
    #[must_use]
    pub fn resume(state: R::State, position: Position, reducer: R, config: EngineConfig) -> Self {
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                reducer,
                published: Mutex::new(Published { state, position }),
                changes: Broadcaster::new(config.broadcast("changes")),
                status,
                started: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Create an engine and start it on `input`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn<St>(initial: R::State, reducer: R, input: St, config: EngineConfig) -> Self
    where
        St: Stream<Item = Result<R::Event, StreamError>> + Send + 'static,
    {
        let engine = Self::with_config(initial, reducer, config);
        engine.shared.started.store(true, Ordering::SeqCst);
        engine.launch(input);
        engine
    }

    /// Attach the input and begin folding.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] on the second call.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<St>(&self, input: St) -> Result<(), EngineError>
    where
        St: Stream<Item = Result<R::Event, StreamError>> + Send + 'static,
    {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }
        self.launch(input);
        Ok(())
    }

    fn launch<St>(&self, input: St)
    where
        St: Stream<Item = Result<R::Event, StreamError>> + Send + 'static,
    {
        self.shared.status.send_replace(EngineStatus::Running);
        let span = tracing::info_span!("engine", label = %self.shared.config.label);
        tokio::spawn(run(Arc::clone(&self.shared), input).instrument(span));
    }

    /// Current state plus the stream of every later change.
    #[must_use]
    pub fn subscribe(&self) -> EngineSubscription<R::State, R::Event> {
        let (subscription, registered) = {
            let published = self.shared.published();
            let (changes, registered) = self.shared.changes.register();
            let subscription = EngineSubscription {
                current_state: published.state.clone(),
                position: published.position,
                changes,
            };
            (subscription, registered)
        };

        // Observers run outside the lock so they may query the engine.
        if let Some(subscribers) = registered {
            self.shared.changes.announce(subscribers);
        }
        subscription
    }

    /// State after the last published change.
    #[must_use]
    pub fn current_state(&self) -> R::State {
        self.shared.published().state.clone()
    }

    /// Position of [`current_state`](Self::current_state).
    #[must_use]
    pub fn position(&self) -> Position {
        self.shared.published().position
    }

    /// Lifecycle status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.shared.status.borrow().clone()
    }

    /// Wait until the engine has ended or failed.
    pub async fn terminated(&self) -> EngineStatus {
        let mut status = self.shared.status.subscribe();
        match status.wait_for(EngineStatus::is_terminal).await {
            Ok(terminal) => terminal.clone(),
            Err(_) => self.status(),
        }
    }

    /// Number of change subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.changes.subscriber_count()
    }

    /// Label from the config.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.config.label
    }
}

impl<R: Reducer> fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("label", &self.shared.config.label)
            .field("position", &self.position())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

async fn run<R, St>(shared: Arc<Shared<R>>, input: St)
where
    R: Reducer,
    St: Stream<Item = Result<R::Event, StreamError>> + Send + 'static,
{
    let mut input = pin!(input);
    let (mut state, mut position) = {
        let published = shared.published();
        (published.state.clone(), published.position)
    };

    while let Some(next) = input.next().await {
        let event = match next {
            Ok(event) => event,
            Err(error) => return shared.finish(position, Some(error.into_upstream())),
        };

        let previous = state.clone();
        if let Err(error) = shared.reducer.reduce(&mut state, &event) {
            return shared.finish(position, Some(error.into()));
        }
        position = position.next();

        let change = Arc::new(Change::new(position, previous, event, state.clone()));
        let round = {
            let mut published = shared.published();
            published.state = state.clone();
            published.position = position;
            shared.changes.publish(change)
        };

        shared.config.observer.observe(Observation::Reduced {
            component: &shared.config.label,
            position,
        });

        match round.await {
            Ok(_) => {},
            Err(PublishError::Delivery(error)) => {
                return shared.finish(position, Some(error));
            },
            Err(PublishError::Terminated) => {
                // Only the worker terminates the broadcaster; nothing left to do.
                return;
            },
        }
    }

    shared.finish(position, None);
}
