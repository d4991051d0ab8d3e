//! Persistent engines over a real journal directory

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use serde::{Deserialize, Serialize};
use streamfold_core::{Journal, LogEntry, Position, Reducer, Snapshot, reducer_fn};
use streamfold_file::{FileJournal, LOG_FILE};
use streamfold_runtime::{PersistenceConfig, PersistentEngine};
use streamfold_testing::helpers::{events, quiet_config};
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Tally {
    count: u32,
    total: i64,
}

fn tally() -> impl Reducer<State = Tally, Event = i64> {
    reducer_fn(|tally: &mut Tally, n: &i64| {
        tally.count += 1;
        tally.total += n;
        Ok(())
    })
}

async fn run_session(dir: &TempDir, input: Vec<i64>, interval: u64) -> Tally {
    let journal = FileJournal::open(dir.path()).await.unwrap();
    let config = PersistenceConfig::new(quiet_config("tally")).with_compaction_interval(interval);
    let persistent = PersistentEngine::open(journal, Tally::default(), tally(), events(input), config)
        .await
        .unwrap();
    persistent.writer().finished().await.unwrap();
    persistent.engine().current_state()
}

#[tokio::test]
async fn sessions_pick_up_where_the_last_one_stopped() {
    let dir = TempDir::new().unwrap();

    let first = run_session(&dir, vec![1, 2, 3, 4, 5], 2).await;
    assert_eq!(first, Tally { count: 5, total: 15 });

    let journal = FileJournal::<Tally, i64>::open(dir.path()).await.unwrap();
    let contents = journal.read().await.unwrap();
    let snapshot = contents.snapshot.unwrap();
    assert_eq!(snapshot.position, Position::new(4));
    assert_eq!(snapshot.state, Tally { count: 4, total: 10 });
    assert_eq!(contents.log, vec![LogEntry::new(Position::new(5), 5)]);

    let second = run_session(&dir, vec![10], 2).await;
    assert_eq!(second, Tally { count: 6, total: 25 });
}

#[tokio::test]
async fn stale_log_entries_next_to_a_snapshot_are_not_replayed() {
    let dir = TempDir::new().unwrap();
    {
        // A snapshot at 2 saved just before a crash, with the log untruncated.
        let journal = FileJournal::<Tally, i64>::open(dir.path()).await.unwrap();
        for (n, event) in [(1, 1), (2, 2), (3, 3)] {
            journal.append(Position::new(n), Tally::default(), event).await.unwrap();
        }
        journal
            .save_snapshot(Snapshot::new(Tally { count: 2, total: 3 }, Position::new(2)))
            .await
            .unwrap();
    }

    let resumed = run_session(&dir, vec![], 0).await;
    assert_eq!(resumed, Tally { count: 3, total: 6 });
}

#[tokio::test]
async fn a_torn_append_loses_only_the_torn_event() {
    let dir = TempDir::new().unwrap();
    run_session(&dir, vec![1, 2], 0).await;

    let log = dir.path().join(LOG_FILE);
    let mut raw = std::fs::read_to_string(&log).unwrap();
    raw.push_str("{\"position\":3,\"eve");
    std::fs::write(&log, raw).unwrap();

    let resumed = run_session(&dir, vec![7], 0).await;
    assert_eq!(resumed, Tally { count: 3, total: 10 });
}

/// Doubles with all 53 mantissa bits in play, from a fixed LCG.
fn awkward_doubles(count: usize) -> Vec<f64> {
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    (0..count)
        .map(|_| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            #[allow(clippy::cast_precision_loss)]
            let unit = (seed >> 11) as f64 / (1_u64 << 53) as f64;
            unit
        })
        .collect()
}

#[tokio::test]
async fn doubles_read_back_bit_for_bit() {
    let dir = TempDir::new().unwrap();
    let journal = FileJournal::<f64, f64>::open(dir.path()).await.unwrap();
    let written = awkward_doubles(2000);

    for (n, sample) in (1..).zip(&written) {
        journal.append(Position::new(n), *sample, *sample).await.unwrap();
    }
    let last = written[written.len() - 1];
    journal
        .save_snapshot(Snapshot::new(last, Position::new(written.len() as u64)))
        .await
        .unwrap();

    let contents = journal.read().await.unwrap();
    let read: Vec<u64> = contents.log.iter().map(|entry| entry.event.to_bits()).collect();
    let expected: Vec<u64> = written.iter().map(|sample| sample.to_bits()).collect();
    assert_eq!(read, expected);
    assert_eq!(contents.snapshot.unwrap().state.to_bits(), last.to_bits());
}
