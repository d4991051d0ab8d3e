//! Engine variant that publishes derived outputs on named channels.
//!
//! A [`SplitEngine`] folds its input with a [`SplitReducer`] exactly like
//! [`Engine`](crate::engine::Engine), but instead of publishing change records
//! it publishes whatever the reducer emitted, each value on its own channel.
//! Channels are the variants of the reducer's [`Channel`] enum; one
//! broadcaster is created per variant up front, so subscribing to a channel
//! is total.
//!
//! The folded state itself is never published.
//!
//! Per event, outputs on the same channel are delivered in emission order,
//! different channels are delivered concurrently, and the next event is not
//! pulled until every channel has acknowledged.

use crate::broadcast::{Broadcaster, PublishError, PublishRound, Subscription};
use crate::config::EngineConfig;
use crate::engine::{EngineError, EngineStatus};
use futures::future;
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use streamfold_core::{
    Channel, Derived, Emitter, Observation, Position, SplitReducer, StreamError,
};
use tokio::sync::watch;
use tracing::Instrument;

/// The channel enum of a split reducer's outputs.
pub type ChannelOf<R> = <<R as SplitReducer>::Output as Derived>::Channel;

struct Shared<R: SplitReducer> {
    reducer: R,
    initial: std::sync::Mutex<Option<R::State>>,
    channels: Vec<(ChannelOf<R>, Broadcaster<R::Output>)>,
    position: AtomicU64,
    status: watch::Sender<EngineStatus>,
    started: AtomicBool,
    config: EngineConfig,
}

impl<R: SplitReducer> Shared<R> {
    fn broadcaster(&self, channel: ChannelOf<R>) -> Option<&Broadcaster<R::Output>> {
        self.channels
            .iter()
            .find(|(declared, _)| *declared == channel)
            .map(|(_, broadcaster)| broadcaster)
    }

    fn finish(&self, position: Position, error: Option<StreamError>) {
        self.config.observer.observe(Observation::EngineStopped {
            component: &self.config.label,
            position,
            error: error.as_ref(),
        });
        match error {
            None => {
                for (_, broadcaster) in &self.channels {
                    broadcaster.close();
                }
                self.status.send_replace(EngineStatus::Ended);
            },
            Some(error) => {
                for (_, broadcaster) in &self.channels {
                    broadcaster.fail(error.clone());
                }
                self.status.send_replace(EngineStatus::Failed(error));
            },
        }
    }
}

/// A reactive fold that publishes derived outputs per channel. Cheap to clone.
pub struct SplitEngine<R: SplitReducer> {
    shared: Arc<Shared<R>>,
}

impl<R: SplitReducer> Clone for SplitEngine<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: SplitReducer> SplitEngine<R> {
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
    #[must_use]
    pub fn resume(state: R::State, position: Position, reducer: R, config: EngineConfig) -> Self {
        let channels = ChannelOf::<R>::ALL
            .iter()
            .map(|&channel| (channel, Broadcaster::new(config.broadcast(channel.name()))))
            .collect();
        let (status, _) = watch::channel(EngineStatus::Idle);

        Self {
            shared: Arc::new(Shared {
                reducer,
                initial: std::sync::Mutex::new(Some(state)),
                channels,
                position: AtomicU64::new(position.value()),
                status,
                started: AtomicBool::new(false),
                config,
            }),
        }
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

        let state = self
            .shared
            .initial
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(state) = state else {
            return Err(EngineError::AlreadyStarted);
        };

        self.shared.status.send_replace(EngineStatus::Running);
        let span = tracing::info_span!("split_engine", label = %self.shared.config.label);
        tokio::spawn(run(Arc::clone(&self.shared), state, input).instrument(span));
        Ok(())
    }

    /// Subscribe to one channel.
    ///
    /// Only outputs emitted after this call are delivered. A channel missing
    /// from [`Channel::ALL`] yields a subscription that fails immediately.
    #[must_use]
    pub fn subscribe(&self, channel: ChannelOf<R>) -> Subscription<R::Output> {
        if let Some(broadcaster) = self.shared.broadcaster(channel) {
            return broadcaster.subscribe();
        }

        tracing::warn!(channel = channel.name(), "Subscribed to an undeclared channel");
        let orphan = Broadcaster::new(self.shared.config.broadcast(channel.name()));
        orphan.fail(undeclared(channel));
        orphan.subscribe()
    }

    /// Number of subscribers on one channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: ChannelOf<R>) -> usize {
        self.shared
            .broadcaster(channel)
            .map_or(0, Broadcaster::subscriber_count)
    }

    /// Position of the last folded event.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.shared.position.load(Ordering::SeqCst))
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

    /// Label from the config.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.config.label
    }
}

impl<R: SplitReducer> fmt::Debug for SplitEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitEngine")
            .field("label", &self.shared.config.label)
            .field("channels", &self.shared.channels.len())
            .field("position", &self.position())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn undeclared<C: Channel>(channel: C) -> StreamError {
    StreamError::Reduction(format!("channel {} is not declared", channel.name()))
}

async fn run<R, St>(shared: Arc<Shared<R>>, mut state: R::State, input: St)
where
    R: SplitReducer,
    St: Stream<Item = Result<R::Event, StreamError>> + Send + 'static,
{
    let mut input = pin!(input);
    let mut position = Position::new(shared.position.load(Ordering::SeqCst));

    while let Some(next) = input.next().await {
        let event = match next {
            Ok(event) => event,
            Err(error) => return shared.finish(position, Some(error.into_upstream())),
        };

        // Fold into a scratch copy so a failing event leaves no trace.
        let mut folded = state.clone();
        let mut emit = Emitter::new();
        if let Err(error) = shared.reducer.reduce(&mut folded, &event, &mut emit) {
            return shared.finish(position, Some(error.into()));
        }
        // Route everything first: an event's outputs are published all or none.
        let mut routed = Vec::with_capacity(emit.len());
        for output in emit.into_outputs() {
            let channel = output.channel();
            let Some(broadcaster) = shared.broadcaster(channel) else {
                return shared.finish(position, Some(undeclared(channel)));
            };
            routed.push((broadcaster, output));
        }

        state = folded;
        position = position.next();
        shared.position.store(position.value(), Ordering::SeqCst);
        let rounds: Vec<PublishRound> = routed
            .into_iter()
            .map(|(broadcaster, output)| broadcaster.publish(output))
            .collect();

        shared.config.observer.observe(Observation::Reduced {
            component: &shared.config.label,
            position,
        });

        match future::try_join_all(rounds).await {
            Ok(_) => {},
            Err(PublishError::Delivery(error)) => {
                return shared.finish(position, Some(error));
            },
            Err(PublishError::Terminated) => return,
        }
    }

    shared.finish(position, None);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use streamfold_core::{NoopObserver, ReduceError};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Parity {
        Even,
        Odd,
    }

    impl Channel for Parity {
        const ALL: &'static [Self] = &[Self::Even, Self::Odd];

        fn name(self) -> &'static str {
            match self {
                Self::Even => "even",
                Self::Odd => "odd",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Tagged(u32);

    impl Derived for Tagged {
        type Channel = Parity;

        fn channel(&self) -> Parity {
            if self.0 % 2 == 0 { Parity::Even } else { Parity::Odd }
        }
    }

    /// Counts events and emits each value on its parity channel; zero is
    /// emitted twice on `even`.
    struct ParitySplit;

    impl SplitReducer for ParitySplit {
        type State = u32;
        type Event = u32;
        type Output = Tagged;

        fn reduce(
            &self,
            count: &mut u32,
            event: &u32,
            emit: &mut Emitter<Tagged>,
        ) -> Result<(), ReduceError> {
            if *event == 13 {
                return Err(ReduceError::new("unlucky"));
            }
            *count += 1;
            emit.emit(Tagged(*event));
            if *event == 0 {
                emit.emit(Tagged(0));
            }
            Ok(())
        }
    }

    fn quiet() -> EngineConfig {
        EngineConfig::default()
            .with_label("parity")
            .with_observer(Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn outputs_are_routed_by_channel() {
        let engine = SplitEngine::with_config(0, ParitySplit, quiet());
        let even = engine.subscribe(Parity::Even);
        let odd = engine.subscribe(Parity::Odd);
        engine
            .start(futures::stream::iter([1, 2, 0, 3].map(Ok)))
            .unwrap();

        let (even, odd) = tokio::join!(
            even.map(|o| o.unwrap().0).collect::<Vec<_>>(),
            odd.map(|o| o.unwrap().0).collect::<Vec<_>>()
        );
        assert_eq!(even, vec![2, 0, 0]);
        assert_eq!(odd, vec![1, 3]);
        assert_eq!(engine.terminated().await, EngineStatus::Ended);
        assert_eq!(engine.position(), Position::new(4));
    }

    #[tokio::test]
    async fn reducer_failure_reaches_every_channel() {
        let engine = SplitEngine::with_config(0, ParitySplit, quiet());
        let even = engine.subscribe(Parity::Even);
        let odd = engine.subscribe(Parity::Odd);
        engine
            .start(futures::stream::iter([1, 13, 2].map(Ok)))
            .unwrap();

        let (even, odd) = tokio::join!(even.collect::<Vec<_>>(), odd.collect::<Vec<_>>());
        let error = StreamError::Reduction("unlucky".to_string());
        assert_eq!(even, vec![Err(error.clone())]);
        assert_eq!(odd, vec![Ok(Tagged(1)), Err(error.clone())]);
        assert_eq!(engine.terminated().await, EngineStatus::Failed(error));
        assert_eq!(engine.position(), Position::new(1));
    }

    #[tokio::test]
    async fn second_start_is_refused() {
        let engine = SplitEngine::with_config(0, ParitySplit, quiet());
        engine.start(futures::stream::empty()).unwrap();
        assert_eq!(
            engine.start(futures::stream::empty()),
            Err(EngineError::AlreadyStarted)
        );
    }

    #[test]
    fn subscriber_counts_per_channel() {
        let engine = SplitEngine::with_config(0, ParitySplit, quiet());
        let _even = engine.subscribe(Parity::Even);
        assert_eq!(engine.subscriber_count(Parity::Even), 1);
        assert_eq!(engine.subscriber_count(Parity::Odd), 0);
    }
}
