//! Integration tests for split engines
//!
//! A small account ledger emits balance updates and overdraft alerts on
//! separate channels.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use std::time::Duration;
use streamfold_core::{
    Channel, Derived, Emitter, JournalContents, LogEntry, Position, ReduceError, Snapshot,
    SplitReducer, StreamError,
};
use streamfold_runtime::{EngineStatus, SplitEngine, bridge, recover_split};
use streamfold_testing::SplitFoldTest;
use streamfold_testing::helpers::{drain, events, quiet_config};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Feed {
    Balances,
    Alerts,
    /// Never declared in `ALL`.
    Audit,
}

impl Channel for Feed {
    const ALL: &'static [Self] = &[Self::Balances, Self::Alerts];

    fn name(self) -> &'static str {
        match self {
            Self::Balances => "balances",
            Self::Alerts => "alerts",
            Self::Audit => "audit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Notice {
    Balance(i64),
    Overdrawn { by: i64 },
    Audited(i64),
}

impl Derived for Notice {
    type Channel = Feed;

    fn channel(&self) -> Feed {
        match self {
            Self::Balance(_) => Feed::Balances,
            Self::Overdrawn { .. } => Feed::Alerts,
            Self::Audited(_) => Feed::Audit,
        }
    }
}

/// Applies signed amounts. Emits the new balance, plus an alert when the
/// balance drops below zero. An amount of exactly 1000 is "audited" onto the
/// undeclared channel; 0 is rejected.
struct Ledger;

impl SplitReducer for Ledger {
    type State = i64;
    type Event = i64;
    type Output = Notice;

    fn reduce(
        &self,
        balance: &mut i64,
        amount: &i64,
        emit: &mut Emitter<Notice>,
    ) -> Result<(), ReduceError> {
        if *amount == 0 {
            return Err(ReduceError::new("empty transfer"));
        }
        *balance += amount;
        emit.emit(Notice::Balance(*balance));
        if *balance < 0 {
            emit.emit(Notice::Overdrawn { by: -*balance });
        }
        if *amount == 1000 {
            emit.emit(Notice::Audited(*amount));
        }
        Ok(())
    }
}

// ============================================================================
// Fold
// ============================================================================

#[test]
fn ledger_emits_alerts_after_balances() {
    SplitFoldTest::new(Ledger)
        .given_state(10)
        .when_events([-5, -10])
        .then_state(|balance| assert_eq!(*balance, -5))
        .then_outputs(|outputs| {
            assert_eq!(
                outputs,
                [
                    Notice::Balance(5),
                    Notice::Balance(-5),
                    Notice::Overdrawn { by: 5 }
                ]
            );
        })
        .run();
}

// ============================================================================
// Engine
// ============================================================================

#[tokio::test]
async fn each_channel_sees_only_its_outputs_in_order() {
    let engine = SplitEngine::with_config(0, Ledger, quiet_config("ledger"));
    let balances = tokio::spawn(drain(engine.subscribe(Feed::Balances)));
    let alerts = tokio::spawn(drain(engine.subscribe(Feed::Alerts)));

    engine.start(events([5, -8, 4, -3])).unwrap();

    let (balances, error) = balances.await.unwrap();
    assert!(error.is_none());
    assert_eq!(
        balances,
        vec![
            Notice::Balance(5),
            Notice::Balance(-3),
            Notice::Balance(1),
            Notice::Balance(-2)
        ]
    );

    let (alerts, error) = alerts.await.unwrap();
    assert!(error.is_none());
    assert_eq!(
        alerts,
        vec![Notice::Overdrawn { by: 3 }, Notice::Overdrawn { by: 2 }]
    );
    assert_eq!(engine.terminated().await, EngineStatus::Ended);
    assert_eq!(engine.position(), Position::new(4));
}

#[tokio::test]
async fn a_stalled_channel_holds_back_the_next_event() {
    let engine = SplitEngine::with_config(0, Ledger, quiet_config("stalled"));
    let mut alerts = engine.subscribe(Feed::Alerts);
    let mut balances = engine.subscribe(Feed::Balances);
    let (input, source) = bridge();
    engine.start(source).unwrap();

    let mut overdraft = input.push(-1).unwrap();
    assert_eq!(balances.next().await, Some(Ok(Notice::Balance(-1))));
    assert_eq!(alerts.next().await, Some(Ok(Notice::Overdrawn { by: 1 })));

    // Balances comes back for more; alerts does not, so the event stays taken.
    assert!(
        tokio::time::timeout(Duration::from_millis(10), balances.next())
            .await
            .is_err()
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut overdraft)
            .await
            .is_err()
    );

    let next = input.push(3).unwrap();
    input.close();
    let (alerts, balances) = tokio::join!(drain(alerts), drain(balances));
    assert_eq!(alerts, (vec![], None));
    assert_eq!(balances, (vec![Notice::Balance(2)], None));

    overdraft.await.unwrap();
    next.await.unwrap();
    assert_eq!(engine.terminated().await, EngineStatus::Ended);
}

#[tokio::test]
async fn resumes_after_a_muted_replay() {
    let contents = JournalContents {
        snapshot: Some(Snapshot::new(20, Position::new(2))),
        log: vec![
            LogEntry::new(Position::new(2), -10),
            LogEntry::new(Position::new(3), -25),
        ],
    };
    let recovered = recover_split(contents, 0, &Ledger).unwrap();
    assert_eq!(recovered.state, -5);
    assert_eq!(recovered.position, Position::new(3));
    assert_eq!((recovered.replayed, recovered.skipped), (1, 1));

    let engine = SplitEngine::resume(
        recovered.state,
        recovered.position,
        Ledger,
        quiet_config("resumed"),
    );
    let alerts = tokio::spawn(drain(engine.subscribe(Feed::Alerts)));
    engine.start(events([2])).unwrap();

    // The replayed overdraft is not announced again; only the live one is.
    let (alerts, _) = alerts.await.unwrap();
    assert_eq!(alerts, vec![Notice::Overdrawn { by: 3 }]);
    assert_eq!(engine.position(), Position::new(4));
}

#[tokio::test]
async fn undeclared_channels_fail() {
    let engine = SplitEngine::with_config(0, Ledger, quiet_config("audit"));

    let mut audit = engine.subscribe(Feed::Audit);
    assert_eq!(engine.subscriber_count(Feed::Audit), 0);
    let Some(Err(StreamError::Reduction(message))) = audit.next().await else {
        panic!("an undeclared channel should fail its subscriber");
    };
    assert!(message.contains("audit"));

    let balances = tokio::spawn(drain(engine.subscribe(Feed::Balances)));
    engine.start(events([1, 1000, 1])).unwrap();

    // The audited event publishes nothing, not even its balance.
    let (seen, error) = balances.await.unwrap();
    assert_eq!(seen, vec![Notice::Balance(1)]);
    assert!(matches!(error, Some(StreamError::Reduction(_))));
    assert!(matches!(
        engine.terminated().await,
        EngineStatus::Failed(StreamError::Reduction(_))
    ));
    // Nothing of the audited event was published, so it was never taken.
    assert_eq!(engine.position(), Position::new(1));
}

#[tokio::test]
async fn reducer_errors_keep_the_last_good_position() {
    let engine = SplitEngine::with_config(0, Ledger, quiet_config("rejects"));
    let balances = tokio::spawn(drain(engine.subscribe(Feed::Balances)));
    engine.start(events([4, 0, 4])).unwrap();

    let (seen, error) = balances.await.unwrap();
    assert_eq!(seen, vec![Notice::Balance(4)]);
    assert_eq!(error, Some(StreamError::Reduction("empty transfer".to_string())));
    assert_eq!(engine.position(), Position::new(1));
}
