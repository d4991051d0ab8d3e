//! Fan-out of one stream to many subscribers with lock-step backpressure.
//!
//! A [`Broadcaster`] keeps a registry of subscribers, each fed through its own
//! [bridge](crate::bridge). [`Broadcaster::publish`] pushes an item to every
//! subscriber registered at that instant and resolves once *all* of them have
//! acknowledged it, so the slowest subscriber paces the producer.
//!
//! # Guarantees
//!
//! - Every subscriber sees items in publish order.
//! - A subscriber only sees items published after it joined.
//! - Leaving mid-round releases the round instead of stalling it.
//! - A rejected delivery fails the whole broadcaster (fail-fast): every
//!   remaining subscriber receives the same `Delivery` error and nothing more.
//! - Exactly one terminal signal is delivered, after which the registry is
//!   frozen. Late subscribers receive that signal immediately.
//!
//! # Example
//!
//! ```
//! use futures::StreamExt;
//! use streamfold_runtime::broadcast::Broadcaster;
//! use streamfold_runtime::config::BroadcastConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let broadcaster = Broadcaster::new(BroadcastConfig::default());
//! let mut subscription = broadcaster.subscribe();
//!
//! let consumer = tokio::spawn(async move {
//!     let mut seen = Vec::new();
//!     while let Some(Ok(item)) = subscription.next().await {
//!         seen.push(item);
//!     }
//!     seen
//! });
//!
//! for n in 0..3 {
//!     broadcaster.publish(n).await.ok();
//! }
//! broadcaster.close();
//!
//! assert_eq!(consumer.await.ok(), Some(vec![0, 1, 2]));
//! # }
//! ```

use crate::bridge::{BridgeError, BridgeReceiver, BridgeSender, bridge};
use crate::config::BroadcastConfig;
use futures::future::{self, Future};
use futures::stream::{FusedStream, Stream, StreamExt};
use std::fmt;
use std::pin::{Pin, pin};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Instant;
use streamfold_core::{Observation, StreamError};
use thiserror::Error;

/// Identifies one subscriber within a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Get the raw id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The terminal signal a broadcaster delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Graceful end
    Ended,
    /// Failure, delivered identically to every subscriber
    Failed(StreamError),
}

impl Termination {
    /// The failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Ended => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Why a publish round did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The broadcaster delivered its terminal signal before or during the round.
    #[error("Broadcaster already terminated")]
    Terminated,

    /// A subscriber rejected the item; the broadcaster has failed with this error.
    #[error(transparent)]
    Delivery(StreamError),
}

/// Future of one publish round, resolving to the number of subscribers served.
pub type PublishRound = Pin<Box<dyn Future<Output = Result<usize, PublishError>> + Send>>;

struct Registry<T> {
    next_id: u64,
    subscribers: Vec<(SubscriberId, BridgeSender<T>)>,
    termination: Option<Termination>,
}

struct Inner<T> {
    registry: Mutex<Registry<T>>,
    config: BroadcastConfig,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, observation: Observation<'_>) {
        self.config.observer.observe(observation);
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (sender, subscribers) = {
            let mut registry = self.lock();
            let Some(index) = registry.subscribers.iter().position(|(s, _)| *s == id) else {
                return false;
            };
            let (_, sender) = registry.subscribers.remove(index);
            (sender, registry.subscribers.len())
        };

        // Releases any round waiting on this subscriber.
        sender.detach();
        self.observe(Observation::Unsubscribed {
            component: &self.config.label,
            subscribers,
        });
        true
    }

    fn terminate(&self, termination: Termination) -> bool {
        let subscribers = {
            let mut registry = self.lock();
            if registry.termination.is_some() {
                return false;
            }
            registry.termination = Some(termination.clone());
            std::mem::take(&mut registry.subscribers)
        };

        for (_, sender) in &subscribers {
            match &termination {
                Termination::Ended => sender.close(),
                Termination::Failed(error) => sender.fail(error.clone()),
            };
        }

        self.observe(Observation::Terminated {
            component: &self.config.label,
            error: termination.error(),
            subscribers: subscribers.len(),
        });
        true
    }
}

/// Fan-out hub. Cheap to clone; clones share one registry.
pub struct Broadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.lock();
        f.debug_struct("Broadcaster")
            .field("label", &self.inner.config.label)
            .field("subscribers", &registry.subscribers.len())
            .field("termination", &registry.termination)
            .finish()
    }
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + 'static,
{
    /// Create a broadcaster fed by [`publish`](Self::publish).
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    next_id: 0,
                    subscribers: Vec::new(),
                    termination: None,
                }),
                config,
            }),
        }
    }

    /// Create a broadcaster over a source stream.
    ///
    /// A single worker task pulls one item at a time, publishes it and waits
    /// for the round before pulling again. The source ending closes the
    /// broadcaster; a source error fails it with that error.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn from_stream<St>(source: St, config: BroadcastConfig) -> Self
    where
        St: Stream<Item = Result<T, StreamError>> + Send + 'static,
    {
        let broadcaster = Self::new(config);
        tokio::spawn(broadcaster.clone().distribute(source));
        broadcaster
    }

    async fn distribute<St>(self, source: St)
    where
        St: Stream<Item = Result<T, StreamError>> + Send + 'static,
    {
        let mut source = pin!(source);
        while let Some(next) = source.next().await {
            match next {
                Ok(item) => {
                    if let Err(error) = self.publish(item).await {
                        tracing::debug!(label = %self.inner.config.label, %error, "Distribution stopped");
                        return;
                    }
                },
                Err(error) => {
                    self.fail(error);
                    return;
                },
            }
        }
        self.close();
    }

    /// Register a new subscriber.
    ///
    /// It receives every item published after this call. After the terminal
    /// signal, the returned subscription yields that signal immediately.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let (subscription, subscribers) = self.register();
        if let Some(subscribers) = subscribers {
            self.announce(subscribers);
        }
        subscription
    }

    /// [`subscribe`](Self::subscribe) without notifying the observer.
    ///
    /// Returns the registry size if the subscriber was registered, `None`
    /// if the broadcaster had already terminated.
    pub(crate) fn register(&self) -> (Subscription<T>, Option<usize>) {
        let (sender, receiver) = bridge();
        let (id, subscribers) = {
            let mut registry = self.inner.lock();
            let id = SubscriberId(registry.next_id);
            registry.next_id += 1;

            match &registry.termination {
                Some(Termination::Ended) => {
                    sender.close();
                    (id, None)
                },
                Some(Termination::Failed(error)) => {
                    sender.fail(error.clone());
                    (id, None)
                },
                None => {
                    registry.subscribers.push((id, sender));
                    (id, Some(registry.subscribers.len()))
                },
            }
        };

        let subscription = Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.inner),
        };
        (subscription, subscribers)
    }

    /// Report a registration made by [`register`](Self::register).
    pub(crate) fn announce(&self, subscribers: usize) {
        self.inner.observe(Observation::Subscribed {
            component: &self.inner.config.label,
            subscribers,
        });
    }

    /// Remove a subscriber.
    ///
    /// A round waiting on it is released. Returns `false` if the id is not
    /// registered (already gone, or the broadcaster has terminated).
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Start a publish round.
    ///
    /// The registry is snapshotted and the item handed to every subscriber
    /// before this returns; the returned future resolves once each of them
    /// has acknowledged the item or left. Items published with no subscribers
    /// are dropped.
    pub fn publish(&self, item: T) -> PublishRound {
        let started = Instant::now();
        let deliveries = {
            let mut registry = self.inner.lock();
            if registry.termination.is_some() {
                return Box::pin(future::ready(Err(PublishError::Terminated)));
            }

            let mut deliveries = Vec::with_capacity(registry.subscribers.len());
            registry.subscribers.retain(|(id, sender)| match sender.push(item.clone()) {
                Ok(delivery) => {
                    deliveries.push((*id, delivery));
                    true
                },
                // Consumer vanished without unsubscribing.
                Err(_) => false,
            });
            deliveries
        };

        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let subscribers = deliveries.len();
            let round = future::try_join_all(deliveries.into_iter().map(|(id, delivery)| async move {
                match delivery.await {
                    Ok(()) | Err(BridgeError::Disconnected) => Ok(()),
                    Err(BridgeError::Terminated | BridgeError::Failed(_)) => {
                        Err(PublishError::Terminated)
                    },
                    Err(error @ BridgeError::Rejected(_)) => Err(PublishError::Delivery(
                        StreamError::Delivery(format!("subscriber {id}: {error}")),
                    )),
                }
            }))
            .await;

            match round {
                Ok(_) => {
                    inner.observe(Observation::Published {
                        component: &inner.config.label,
                        subscribers,
                        elapsed: started.elapsed(),
                    });
                    Ok(subscribers)
                },
                Err(PublishError::Delivery(error)) => {
                    inner.terminate(Termination::Failed(error.clone()));
                    Err(PublishError::Delivery(error))
                },
                Err(PublishError::Terminated) => Err(PublishError::Terminated),
            }
        })
    }

    /// Deliver the graceful terminal signal.
    ///
    /// Items already handed to subscribers are still delivered. Returns
    /// `false` if the broadcaster had already terminated.
    pub fn close(&self) -> bool {
        self.inner.terminate(Termination::Ended)
    }

    /// Deliver `error` to every subscriber as the terminal signal.
    ///
    /// Items not yet taken by a subscriber are dropped. Returns `false` if the
    /// broadcaster had already terminated.
    pub fn fail(&self, error: StreamError) -> bool {
        self.inner.terminate(Termination::Failed(error))
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// The terminal signal, once delivered.
    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.inner.lock().termination.clone()
    }

    /// Whether the terminal signal has been delivered.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.lock().termination.is_some()
    }

    /// Label from the config.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.config.label
    }
}

/// One subscriber's view of a broadcaster.
///
/// Yields `Ok(item)` for each delivered item, at most one `Err` if the
/// broadcaster failed, then ends. Taking the next item acknowledges the
/// previous one. Dropping the subscription unsubscribes it.
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: BridgeReceiver<T>,
    registry: Weak<Inner<T>>,
}

impl<T> Subscription<T> {
    /// This subscriber's id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Leave the broadcaster.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Refuse the item currently held.
    ///
    /// The publish round fails and the broadcaster terminates with a
    /// `Delivery` error for every subscriber. Returns `false` if no item is
    /// held.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.receiver.reject(reason)
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_next(cx)
    }
}

impl<T> FusedStream for Subscription<T> {
    fn is_terminated(&self) -> bool {
        self.receiver.is_terminated()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("receiver", &self.receiver)
            .finish()
    }
}
