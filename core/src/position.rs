//! Log positions.
//!
//! A [`Position`] counts the events folded into a piece of state. The initial
//! state sits at position 0, and the change produced by the n-th event carries
//! position n. Snapshots record the position of the last event they subsume,
//! which is what lets recovery skip log entries a snapshot already contains.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an event in the single ordered source.
///
/// # Examples
///
/// ```
/// use streamfold_core::position::Position;
///
/// let p0 = Position::INITIAL;
/// let p1 = p0.next();
/// assert_eq!(p1, Position::new(1));
/// assert!(p0.is_initial());
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position(u64);

impl Position {
    /// Position of a state that has not folded any events.
    pub const INITIAL: Self = Self(0);

    /// Create a position from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value of the position.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The position of the event following this one.
    ///
    /// # Overflow Behavior
    ///
    /// Saturates at `u64::MAX`, which no realistic event source reaches.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Check whether no events have been folded yet.
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Position> for u64 {
    fn from(position: Position) -> Self {
        position.0
    }
}
