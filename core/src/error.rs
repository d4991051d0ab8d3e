//! Error taxonomy shared by every component.
//!
//! A [`StreamError`] is the terminal error carried by a sequence. It is
//! `Clone` because one failure is broadcast to every subscriber that is
//! registered when it happens.

use std::fmt;
use thiserror::Error;

/// Terminal error of a sequence, broadcaster or engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A subscriber's acknowledgment step failed.
    ///
    /// Aborts the current publish round for every subscriber and fails the
    /// broadcaster.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The fold function rejected an event.
    ///
    /// Fatal to the owning engine.
    #[error("Reduction failed: {0}")]
    Reduction(String),

    /// The input source failed.
    #[error("Upstream failed: {0}")]
    Upstream(String),

    /// The write-back collaborator failed.
    ///
    /// Only ever terminates the persistence subscription itself.
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl StreamError {
    /// Build an upstream error from anything displayable.
    #[must_use]
    pub fn upstream(reason: impl fmt::Display) -> Self {
        Self::Upstream(reason.to_string())
    }

    /// Re-classify an error arriving on an engine's input as an upstream
    /// failure, keeping upstream errors untouched.
    #[must_use]
    pub fn into_upstream(self) -> Self {
        match self {
            Self::Upstream(_) => self,
            other => Self::Upstream(other.to_string()),
        }
    }

    /// Short, stable name of the error class (used as a metrics label).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Delivery(_) => "delivery",
            Self::Reduction(_) => "reduction",
            Self::Upstream(_) => "upstream",
            Self::Persistence(_) => "persistence",
        }
    }
}

/// Error raised by a fold function for a given event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ReduceError {
    message: String,
}

impl ReduceError {
    /// Create a reduce error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ReduceError> for StreamError {
    fn from(error: ReduceError) -> Self {
        Self::Reduction(error.message)
    }
}
