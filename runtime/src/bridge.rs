//! Push-to-pull handoff with acknowledgment-based backpressure.
//!
//! [`bridge`] returns a producer handle and a consumer stream. Every
//! [`BridgeSender::push`] hands back a [`Delivery`] future that resolves once
//! the consumer has taken the item *and come back for the next one* (or
//! stopped consuming while holding it). A producer that awaits each delivery
//! is therefore paced by its consumer.
//!
//! The consumer suspends on an empty queue through a real waker; producers
//! wake it on push and on the terminal signal.
//!
//! # Terminal signals
//!
//! - [`BridgeSender::close`]: items already queued are still delivered, then
//!   the stream ends.
//! - [`BridgeSender::fail`]: preempts. The next poll yields the error, items
//!   still queued are rejected with [`BridgeError::Failed`], then the stream
//!   ends.
//!
//! The first terminal signal wins; later ones are ignored. Pushing after either
//! is rejected immediately.
//!
//! # Example
//!
//! ```
//! use futures::StreamExt;
//! use streamfold_runtime::bridge::bridge;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (sender, mut receiver) = bridge::<u32>();
//!
//! let producer = tokio::spawn(async move {
//!     for n in 1..=3 {
//!         sender.send(n).await.ok();
//!     }
//!     sender.close();
//! });
//!
//! let mut seen = Vec::new();
//! while let Some(Ok(n)) = receiver.next().await {
//!     seen.push(n);
//! }
//! producer.await.ok();
//! assert_eq!(seen, vec![1, 2, 3]);
//! # }
//! ```

use futures::stream::{FusedStream, Stream};
use futures::task::AtomicWaker;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use streamfold_core::StreamError;
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a push or a delivery did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The bridge was closed or failed before the push.
    #[error("Bridge already terminated")]
    Terminated,

    /// The consumer is gone (dropped or detached).
    #[error("Bridge consumer disconnected")]
    Disconnected,

    /// The bridge failed while the item was still queued.
    #[error("Bridge failed: {0}")]
    Failed(StreamError),

    /// The consumer rejected the item it was holding.
    #[error("Item rejected by consumer: {0}")]
    Rejected(String),
}

type Ack = oneshot::Sender<Result<(), BridgeError>>;

struct Queued<T> {
    item: T,
    ack: Ack,
}

enum Terminal {
    Closed,
    Failed(StreamError),
}

struct State<T> {
    queue: VecDeque<Queued<T>>,
    /// Acknowledgment of the item the consumer currently holds.
    held: Option<Ack>,
    terminal: Option<Terminal>,
    detached: bool,
}

impl<T> State<T> {
    fn acknowledge_held(&mut self) {
        if let Some(ack) = self.held.take() {
            let _ = ack.send(Ok(()));
        }
    }

    fn reject_queued(&mut self, error: &BridgeError) {
        for queued in self.queue.drain(..) {
            let _ = queued.ack.send(Err(error.clone()));
        }
    }

    /// Consumer is gone: what it holds counts as delivered, the rest does not.
    fn detach(&mut self) {
        self.detached = true;
        self.acknowledge_held();
        self.reject_queued(&BridgeError::Disconnected);
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    waker: AtomicWaker,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Critical sections never panic midway; a poisoned lock still holds
        // consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a bridge.
#[must_use]
pub fn bridge<T>() -> (BridgeSender<T>, BridgeReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            held: None,
            terminal: None,
            detached: false,
        }),
        waker: AtomicWaker::new(),
    });

    (
        BridgeSender {
            shared: Arc::clone(&shared),
        },
        BridgeReceiver {
            shared,
            finished: false,
        },
    )
}

/// Wrap a push-style producer job in a bridge.
///
/// The job runs on its own task. Returning `Ok(())` closes the bridge;
/// returning an error fails it with that error as an upstream failure.
///
/// # Panics
///
/// Must be called from within a Tokio runtime.
pub fn adapt<T, F, Fut>(job: F) -> BridgeReceiver<T>
where
    T: Send + 'static,
    F: FnOnce(BridgeSender<T>) -> Fut,
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
    let (sender, receiver) = bridge();
    let running = job(sender.clone());

    tokio::spawn(async move {
        match running.await {
            Ok(()) => {
                sender.close();
            },
            Err(error) => {
                tracing::debug!(%error, "Producer job failed");
                sender.fail(error.into_upstream());
            },
        }
    });

    receiver
}

/// Producer side of a bridge. Cheap to clone.
pub struct BridgeSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> BridgeSender<T> {
    /// Enqueue an item.
    ///
    /// Returns a [`Delivery`] that resolves when the consumer has finished
    /// with the item.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Terminated`] after `close` or `fail`
    /// - [`BridgeError::Disconnected`] after the consumer is gone
    pub fn push(&self, item: T) -> Result<Delivery, BridgeError> {
        let (ack, delivered) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            if state.detached {
                return Err(BridgeError::Disconnected);
            }
            if state.terminal.is_some() {
                return Err(BridgeError::Terminated);
            }
            state.queue.push_back(Queued { item, ack });
        }
        self.shared.waker.wake();

        Ok(Delivery { delivered })
    }

    /// Enqueue an item and wait for its delivery.
    ///
    /// # Errors
    ///
    /// Any [`BridgeError`] from [`push`](Self::push) or from the delivery.
    pub async fn send(&self, item: T) -> Result<(), BridgeError> {
        self.push(item)?.await
    }

    /// Mark graceful end. Returns `false` if the bridge was already terminal.
    pub fn close(&self) -> bool {
        self.terminate(Terminal::Closed)
    }

    /// Mark the bridge failed. Returns `false` if it was already terminal.
    pub fn fail(&self, error: StreamError) -> bool {
        self.terminate(Terminal::Failed(error))
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        {
            let mut state = self.shared.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal);
        }
        self.shared.waker.wake();
        true
    }

    /// Cut the consumer off as if it had been dropped.
    ///
    /// The held item counts as delivered, queued items are rejected with
    /// [`BridgeError::Disconnected`], and the consumer's stream ends.
    pub(crate) fn detach(&self) {
        self.shared.lock().detach();
        self.shared.waker.wake();
    }

    /// Whether `close` or `fail` has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shared.lock().terminal.is_some()
    }

    /// Whether the consumer is gone.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.shared.lock().detached
    }

    /// Items queued and not yet taken by the consumer.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

impl<T> Clone for BridgeSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BridgeSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BridgeSender")
            .field("queued", &state.queue.len())
            .field("terminated", &state.terminal.is_some())
            .field("detached", &state.detached)
            .finish()
    }
}

/// Completion of one pushed item.
#[must_use = "a delivery does nothing unless awaited"]
#[derive(Debug)]
pub struct Delivery {
    delivered: oneshot::Receiver<Result<(), BridgeError>>,
}

impl Future for Delivery {
    type Output = Result<(), BridgeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.delivered).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Consumer side of a bridge.
///
/// Yields `Ok(item)` for every delivered item, at most one `Err` for a
/// failed bridge, then ends.
pub struct BridgeReceiver<T> {
    shared: Arc<Shared<T>>,
    finished: bool,
}

impl<T> BridgeReceiver<T> {
    /// Fail the acknowledgment of the item currently held.
    ///
    /// The producer's [`Delivery`] for that item resolves with
    /// [`BridgeError::Rejected`]. Returns `false` if nothing is held.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        let held = self.shared.lock().held.take();
        match held {
            Some(ack) => {
                let _ = ack.send(Err(BridgeError::Rejected(reason.into())));
                true
            },
            None => false,
        }
    }
}

impl<T> Stream for BridgeReceiver<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        // Register before inspecting state so a concurrent push cannot be missed.
        this.shared.waker.register(cx.waker());

        let mut state = this.shared.lock();
        // Coming back for more acknowledges the previous item.
        state.acknowledge_held();

        if state.detached {
            this.finished = true;
            return Poll::Ready(None);
        }

        if let Some(Terminal::Failed(error)) = &state.terminal {
            let error = error.clone();
            state.reject_queued(&BridgeError::Failed(error.clone()));
            this.finished = true;
            return Poll::Ready(Some(Err(error)));
        }

        if let Some(Queued { item, ack }) = state.queue.pop_front() {
            state.held = Some(ack);
            return Poll::Ready(Some(Ok(item)));
        }

        if matches!(state.terminal, Some(Terminal::Closed)) {
            this.finished = true;
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

impl<T> FusedStream for BridgeReceiver<T> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<T> Drop for BridgeReceiver<T> {
    fn drop(&mut self) {
        self.shared.lock().detach();
    }
}

impl<T> fmt::Debug for BridgeReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeReceiver")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
