//! # Streamfold Runtime
//!
//! The concurrency machinery for the Streamfold event-sourcing engine.
//!
//! ## Core Components
//!
//! - **Bridge**: push-style producer to pull-style consumer, with a per-item
//!   acknowledgment that paces the producer
//! - **Broadcaster**: fans one stream out to many subscribers; a round
//!   completes only when every subscriber has acknowledged
//! - **Engine**: folds one ordered input into one authoritative state and
//!   publishes every change; subscribers get the current state plus every
//!   later change, stitched exactly
//! - **Split engine**: publishes reducer-selected outputs on typed channels
//! - **Persistence**: snapshot + log recovery and write-back around an engine
//!
//! ## Example
//!
//! ```
//! use futures::StreamExt;
//! use streamfold_core::reducer_fn;
//! use streamfold_runtime::{Engine, EngineConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let input = futures::stream::iter([1_u64, 2, 3].map(Ok));
//! let engine = Engine::with_config(
//!     0_u64,
//!     reducer_fn(|total: &mut u64, n: &u64| {
//!         *total += n;
//!         Ok(())
//!     }),
//!     EngineConfig::default().with_label("sum"),
//! );
//!
//! let feed = engine.subscribe();
//! engine.start(input).ok();
//!
//! let totals: Vec<u64> = feed
//!     .changes
//!     .filter_map(|change| async move { change.ok().map(|c| c.state) })
//!     .collect()
//!     .await;
//! assert_eq!(totals, vec![1, 3, 6]);
//! # }
//! ```

/// Push-to-pull handoff with acknowledgment-based backpressure
pub mod bridge;

/// Lock-step fan-out to many subscribers
pub mod broadcast;

/// Component configuration
pub mod config;

/// The reactive engine
pub mod engine;

/// Prometheus metrics for observability
pub mod metrics;

/// Default tracing + metrics observer
pub mod observe;

/// Journal recovery and write-back
pub mod persistence;

/// Engine variant publishing derived outputs per channel
pub mod split;

pub use bridge::{BridgeError, BridgeReceiver, BridgeSender, Delivery, adapt, bridge};
pub use broadcast::{Broadcaster, PublishError, SubscriberId, Subscription, Termination};
pub use config::{BroadcastConfig, ConfigError, EngineConfig, PersistenceConfig};
pub use engine::{Engine, EngineError, EngineStatus, EngineSubscription, SharedChange};
pub use observe::TracingObserver;
pub use persistence::{
    PersistenceHandle, PersistentEngine, Recovered, WriterStatus, recover, recover_split,
    recover_with,
};
pub use split::{ChannelOf, SplitEngine};
