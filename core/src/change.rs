//! Change records.

use crate::position::Position;
use serde::{Deserialize, Serialize};

/// The record published once per processed event.
///
/// `previous` is the state before the event, `state` the state after it, and
/// `position` the position of the event in the source (so `state` has folded
/// exactly `position` events since the engine's origin).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<S, E> {
    /// Position of `event`
    pub position: Position,
    /// State before the event was folded
    pub previous: S,
    /// The event that was folded
    pub event: E,
    /// State after the event was folded
    pub state: S,
}

impl<S, E> Change<S, E> {
    /// Create a change record.
    #[must_use]
    pub const fn new(position: Position, previous: S, event: E, state: S) -> Self {
        Self {
            position,
            previous,
            event,
            state,
        }
    }
}
