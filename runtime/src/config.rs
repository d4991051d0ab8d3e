//! Configuration for broadcasters, engines and the persistence façade.
//!
//! Every component takes its observer through its config so the observability
//! sink is injected rather than hardwired. The default observer is
//! [`TracingObserver`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use streamfold_core::NoopObserver;
//! use streamfold_runtime::config::{EngineConfig, PersistenceConfig};
//!
//! let engine = EngineConfig::default()
//!     .with_label("orders")
//!     .with_observer(Arc::new(NoopObserver));
//!
//! let persistence = PersistenceConfig::new(engine).with_compaction_interval(500);
//! assert_eq!(persistence.compaction_interval, 500);
//! ```

use crate::observe::TracingObserver;
use std::fmt;
use std::sync::Arc;
use streamfold_core::Observer;
use thiserror::Error;

/// Environment variable holding the compaction interval.
pub const SNAPSHOT_EVERY_VAR: &str = "STREAMFOLD_SNAPSHOT_EVERY";

/// Errors from reading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unparsable value.
    #[error("Invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

fn default_observer() -> Arc<dyn Observer> {
    Arc::new(TracingObserver)
}

/// Broadcaster configuration.
#[derive(Clone)]
pub struct BroadcastConfig {
    /// Name used in logs and metric labels
    pub label: Arc<str>,
    /// Observability hook
    pub observer: Arc<dyn Observer>,
}

impl BroadcastConfig {
    /// Set the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            label: Arc::from("broadcast"),
            observer: default_observer(),
        }
    }
}

impl fmt::Debug for BroadcastConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastConfig")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    /// Name used in logs and metric labels
    pub label: Arc<str>,
    /// Observability hook, shared with the engine's broadcasters
    pub observer: Arc<dyn Observer>,
}

impl EngineConfig {
    /// Set the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Config for a broadcaster owned by this engine, labelled
    /// `{engine}.{suffix}`.
    #[must_use]
    pub fn broadcast(&self, suffix: &str) -> BroadcastConfig {
        BroadcastConfig {
            label: Arc::from(format!("{}.{suffix}", self.label)),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: Arc::from("engine"),
            observer: default_observer(),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Persistence façade configuration.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Config of the wrapped engine
    pub engine: EngineConfig,
    /// Changes between compactions; `0` never compacts
    pub compaction_interval: u64,
}

impl PersistenceConfig {
    /// Default number of changes between compactions.
    pub const DEFAULT_COMPACTION_INTERVAL: u64 = 1000;

    /// Create a config around an engine config
    #[must_use]
    pub const fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            compaction_interval: Self::DEFAULT_COMPACTION_INTERVAL,
        }
    }

    /// Set the compaction interval
    #[must_use]
    pub const fn with_compaction_interval(mut self, interval: u64) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Override settings from the environment.
    ///
    /// Reads [`SNAPSHOT_EVERY_VAR`]; unset leaves the current value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the variable is not an integer.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        match std::env::var(SNAPSHOT_EVERY_VAR) {
            Ok(value) => self.with_compaction_interval_str(&value),
            Err(_) => Ok(self),
        }
    }

    fn with_compaction_interval_str(self, value: &str) -> Result<Self, ConfigError> {
        value
            .trim()
            .parse()
            .map(|interval| self.with_compaction_interval(interval))
            .map_err(|_| ConfigError::Invalid {
                var: SNAPSHOT_EVERY_VAR,
                value: value.to_string(),
            })
    }

    /// Whether a snapshot is due after `since_snapshot` changes.
    #[must_use]
    pub const fn compaction_due(&self, since_snapshot: u64) -> bool {
        self.compaction_interval > 0 && since_snapshot >= self.compaction_interval
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
