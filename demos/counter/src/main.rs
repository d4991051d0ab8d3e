//! Counter example binary
//!
//! Folds a 200ms ticker into a count. One subscriber watches from the
//! beginning; a second joins two seconds in and starts from the count at that
//! moment.

use counter::{CounterEvent, CounterReducer, CounterState, ticker};
use futures::StreamExt;
use std::time::Duration;
use streamfold_runtime::{Engine, EngineConfig, EngineSubscription};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TICKS: u64 = 20;

async fn watch(name: &'static str, feed: EngineSubscription<CounterState, CounterEvent>) {
    println!("[{name}] subscribing when current state is: {}", feed.current_state.count);
    let mut changes = feed.changes;
    while let Some(change) = changes.next().await {
        match change {
            Ok(change) => println!("[{name}] {} (position {})", change.state.count, change.position),
            Err(error) => println!("[{name}] stream failed: {error}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,streamfold_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Counter Example: late subscribers ===\n");

    let engine = Engine::with_config(
        CounterState::default(),
        CounterReducer,
        EngineConfig::default().with_label("counter"),
    );
    let early = tokio::spawn(watch("from beginning", engine.subscribe()));
    engine.start(ticker(Duration::from_millis(200), Some(TICKS)))?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    let late = tokio::spawn(watch("subscribed later", engine.subscribe()));

    let status = engine.terminated().await;
    early.await?;
    late.await?;

    println!("\nEngine finished: {status:?}, final count {}", engine.current_state().count);
    Ok(())
}
