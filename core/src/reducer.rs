//! Fold functions.
//!
//! Two reducer shapes are supported:
//!
//! - [`Reducer`]: `(state, event) → state`. The engine publishes one
//!   [`Change`](crate::change::Change) per event.
//! - [`SplitReducer`]: additionally selects zero or more derived outputs per
//!   event through an [`Emitter`]. Every output names its channel through
//!   [`Derived::channel`], and channels are a fixed enum implementing
//!   [`Channel`], so an unknown stream name cannot exist at runtime.
//!
//! Both update state in place, like the rest of the workspace's reducers. A
//! reducer that returns an error leaves the engine failed; the partially
//! updated state is never published.

use crate::error::ReduceError;
use smallvec::SmallVec;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// The fold function driving an engine.
///
/// # Example
///
/// ```
/// use streamfold_core::error::ReduceError;
/// use streamfold_core::reducer::Reducer;
///
/// struct Sum;
///
/// impl Reducer for Sum {
///     type State = i64;
///     type Event = i64;
///
///     fn reduce(&self, state: &mut i64, event: &i64) -> Result<(), ReduceError> {
///         *state += event;
///         Ok(())
///     }
/// }
///
/// let mut state = 0;
/// Sum.reduce(&mut state, &5).unwrap();
/// assert_eq!(state, 5);
/// ```
pub trait Reducer: Send + Sync + 'static {
    /// The state folded by this reducer
    type State: Clone + Send + Sync + 'static;

    /// The input event type
    type Event: Clone + Send + Sync + 'static;

    /// Fold one event into the state.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError`] if the event cannot be applied. The owning
    /// engine treats this as fatal.
    fn reduce(&self, state: &mut Self::State, event: &Self::Event) -> Result<(), ReduceError>;
}

/// A [`Reducer`] backed by a closure. Built with [`reducer_fn`].
pub struct FnReducer<S, E, F> {
    f: F,
    _phantom: PhantomData<fn(&mut S, &E)>,
}

/// Adapt a closure into a [`Reducer`].
///
/// ```
/// use streamfold_core::reducer::{reducer_fn, Reducer};
///
/// let add = reducer_fn(|state: &mut u32, event: &u32| {
///     *state += event;
///     Ok(())
/// });
///
/// let mut state = 1;
/// add.reduce(&mut state, &2).unwrap();
/// assert_eq!(state, 3);
/// ```
#[must_use]
pub const fn reducer_fn<S, E, F>(f: F) -> FnReducer<S, E, F>
where
    F: Fn(&mut S, &E) -> Result<(), ReduceError>,
{
    FnReducer {
        f,
        _phantom: PhantomData,
    }
}

impl<S, E, F> Reducer for FnReducer<S, E, F>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(&mut S, &E) -> Result<(), ReduceError> + Send + Sync + 'static,
{
    type State = S;
    type Event = E;

    fn reduce(&self, state: &mut S, event: &E) -> Result<(), ReduceError> {
        (self.f)(state, event)
    }
}

impl<S, E, F> fmt::Debug for FnReducer<S, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer").finish_non_exhaustive()
    }
}

/// A statically declared set of named output channels.
///
/// Implemented by a small fieldless enum:
///
/// ```
/// use streamfold_core::reducer::Channel;
///
/// #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// enum ChatChannel {
///     NameChanges,
///     ChatLines,
/// }
///
/// impl Channel for ChatChannel {
///     const ALL: &'static [Self] = &[Self::NameChanges, Self::ChatLines];
///
///     fn name(self) -> &'static str {
///         match self {
///             Self::NameChanges => "nameChanges",
///             Self::ChatLines => "chatLines",
///         }
///     }
/// }
///
/// assert_eq!(ChatChannel::ALL.len(), 2);
/// ```
pub trait Channel: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every declared channel. The engine creates one broadcaster for each.
    const ALL: &'static [Self];

    /// Stable channel name, used for logging and metrics labels.
    fn name(self) -> &'static str;
}

/// An output value produced by a [`SplitReducer`].
pub trait Derived: Clone + Send + Sync + 'static {
    /// The channel set this output belongs to
    type Channel: Channel;

    /// The channel this value is published on.
    fn channel(&self) -> Self::Channel;
}

/// Collects the derived outputs selected while folding one event.
///
/// A muted emitter drops everything; recovery replays use one so that
/// catching up has no observable side effect.
#[derive(Debug)]
pub struct Emitter<D> {
    emitted: SmallVec<[D; 4]>,
    muted: bool,
}

impl<D> Emitter<D> {
    /// An emitter that records outputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            emitted: SmallVec::new(),
            muted: false,
        }
    }

    /// An emitter that discards outputs.
    #[must_use]
    pub fn muted() -> Self {
        Self {
            emitted: SmallVec::new(),
            muted: true,
        }
    }

    /// Select an output for publication.
    pub fn emit(&mut self, output: D) {
        if !self.muted {
            self.emitted.push(output);
        }
    }

    /// Whether outputs are being discarded.
    #[must_use]
    pub const fn is_muted(&self) -> bool {
        self.muted
    }

    /// Number of recorded outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }

    /// Take the recorded outputs in emission order.
    #[must_use]
    pub fn into_outputs(self) -> SmallVec<[D; 4]> {
        self.emitted
    }
}

impl<D> Default for Emitter<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// A fold function that also selects derived outputs per event.
///
/// # Example
///
/// ```ignore
/// impl SplitReducer for ChatReducer {
///     type State = ChatState;
///     type Event = ChatEvent;
///     type Output = ChatOutput;
///
///     fn reduce(
///         &self,
///         state: &mut ChatState,
///         event: &ChatEvent,
///         emit: &mut Emitter<ChatOutput>,
///     ) -> Result<(), ReduceError> {
///         // update state, then emit zero or more outputs
///         Ok(())
///     }
/// }
/// ```
pub trait SplitReducer: Send + Sync + 'static {
    /// The state folded by this reducer
    type State: Clone + Send + Sync + 'static;

    /// The input event type
    type Event: Clone + Send + Sync + 'static;

    /// The derived output type, tagged with its channel
    type Output: Derived;

    /// Fold one event into the state, emitting derived outputs.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError`] if the event cannot be applied. Outputs
    /// emitted before the error are discarded.
    fn reduce(
        &self,
        state: &mut Self::State,
        event: &Self::Event,
        emit: &mut Emitter<Self::Output>,
    ) -> Result<(), ReduceError>;
}
