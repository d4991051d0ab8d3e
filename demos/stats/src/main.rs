//! Stats example binary
//!
//! Generates random samples, folds them into running statistics and writes
//! every change to a journal directory. Run it twice: the second run resumes
//! from the first run's snapshot and log.

use futures::StreamExt;
use stats::{Stats, StatsReducer, StatsSettings, samples};
use streamfold_file::FileJournal;
use streamfold_runtime::metrics::install_prometheus;
use streamfold_runtime::{EngineConfig, PersistenceConfig, PersistentEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Journal directory when `STREAMFOLD_DATA_DIR` is unset.
const DEFAULT_DATA_DIR: &str = "stats-data";

/// Changes between snapshots when `STREAMFOLD_SNAPSHOT_EVERY` is unset.
const DEFAULT_SNAPSHOT_EVERY: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stats=debug,streamfold_runtime=info,streamfold_file=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = install_prometheus()?;
    let settings = StatsSettings::from_env()?;
    let config = PersistenceConfig::new(EngineConfig::default().with_label("stats"))
        .with_compaction_interval(DEFAULT_SNAPSHOT_EVERY)
        .from_env()?;
    let journal = FileJournal::from_env(DEFAULT_DATA_DIR).await?;

    println!("=== Stats Example: persistent running statistics ===\n");
    println!("Journal directory: {}", journal.dir().display());
    println!(
        "Generating {} samples, snapshot every {} changes\n",
        settings.events, config.compaction_interval
    );

    let persistent = PersistentEngine::open(
        journal,
        Stats::default(),
        StatsReducer,
        samples(settings.events, settings.period, None),
        config,
    )
    .await?;

    let feed = persistent.subscribe();
    println!("Resuming at position {}: {:?}", feed.position, feed.current_state);

    let mut changes = feed.changes;
    while let Some(change) = changes.next().await {
        let change = change?;
        let stats = change.state;
        println!(
            "#{:<6} sample {:.4}  count {}  min {:.4}  max {:.4}  avg {:.4}",
            change.position, change.event, stats.count, stats.min, stats.max, stats.average
        );
    }

    let persisted = persistent.writer().finished().await?;
    println!("\nPersisted through position {persisted}");
    println!("\n{}", metrics.render());
    Ok(())
}
