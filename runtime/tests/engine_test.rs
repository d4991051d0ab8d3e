//! Integration tests for the reactive engine
//!
//! Covers subscribe-time stitching, per-subscriber ordering, leaving
//! mid-round, and terminal propagation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use std::time::Duration;
use streamfold_core::{Position, ReduceError, Reducer, StreamError, reducer_fn};
use streamfold_runtime::{Engine, EngineConfig, EngineStatus, bridge};
use streamfold_testing::Recorded;
use streamfold_testing::helpers::{
    drain, events, events_then_error, init_test_tracing, quiet_config, recording_config,
};

// ============================================================================
// Test Fixtures
// ============================================================================

fn adder() -> impl Reducer<State = i64, Event = i64> {
    reducer_fn(|total: &mut i64, step: &i64| {
        if *step == 0 {
            return Err(ReduceError::new("zero step"));
        }
        *total += step;
        Ok(())
    })
}

// ============================================================================
// Stitching
// ============================================================================

#[tokio::test]
async fn late_subscriber_sees_current_state_then_the_rest() {
    let (input, source) = bridge::<i64>();
    let engine = Engine::with_config(0, adder(), quiet_config("scenario-a"));

    let x = engine.subscribe();
    assert_eq!(x.current_state, 0);
    let x_states = tokio::spawn(async move {
        let (changes, error) = drain(x.changes).await;
        assert!(error.is_none());
        changes.iter().map(|c| c.state).collect::<Vec<_>>()
    });
    engine.start(source).unwrap();

    // Resolves once the engine has published the change and come back for more.
    input.send(1).await.unwrap();

    let y = engine.subscribe();
    assert_eq!(y.current_state, 1);
    assert_eq!(y.position, Position::new(1));
    let y_states = tokio::spawn(async move {
        let (changes, error) = drain(y.changes).await;
        assert!(error.is_none());
        changes.iter().map(|c| c.state).collect::<Vec<_>>()
    });

    input.send(1).await.unwrap();
    input.send(1).await.unwrap();
    input.close();

    assert_eq!(x_states.await.unwrap(), vec![1, 2, 3]);
    assert_eq!(y_states.await.unwrap(), vec![2, 3]);
    assert_eq!(engine.terminated().await, EngineStatus::Ended);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribers_stitch_without_gaps_or_duplicates() {
    let engine = Engine::with_config(0, adder(), quiet_config("stitch"));
    let (input, source) = bridge();
    engine.start(source).unwrap();

    let producer = tokio::spawn(async move {
        for step in 1..=200 {
            input.send(step).await.unwrap();
        }
        input.close();
    });

    let mut joiners = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        joiners.push(tokio::spawn(async move {
            let feed = engine.subscribe();
            let (mut state, mut position) = (feed.current_state, feed.position);
            let (changes, error) = drain(feed.changes).await;
            assert!(error.is_none());

            for change in changes {
                assert_eq!(change.position, position.next());
                assert_eq!(change.previous, state);
                state = change.state;
                position = change.position;
            }
            (state, position)
        }));
        tokio::time::sleep(Duration::from_micros(300)).await;
    }

    producer.await.unwrap();
    let expected: i64 = (1..=200).sum();
    for joiner in joiners {
        assert_eq!(joiner.await.unwrap(), (expected, Position::new(200)));
    }
}

// ============================================================================
// Ordering and backpressure
// ============================================================================

#[tokio::test]
async fn subscribers_at_different_speeds_see_the_same_order() {
    let engine = Engine::with_config(0, adder(), quiet_config("speeds"));
    let consumers: Vec<_> = [0_u64, 1, 3]
        .into_iter()
        .map(|delay_ms| {
            let changes = engine.subscribe().changes;
            tokio::spawn(async move {
                changes
                    .then(move |change| async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        change.unwrap().event
                    })
                    .collect::<Vec<_>>()
                    .await
            })
        })
        .collect();

    engine.start(events(1..=20)).unwrap();

    for consumer in consumers {
        assert_eq!(consumer.await.unwrap(), (1..=20).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn a_stalled_subscriber_holds_back_the_input() {
    let engine = Engine::with_config(0, adder(), quiet_config("stall"));
    let mut stuck = engine.subscribe().changes;
    let (input, source) = bridge();
    engine.start(source).unwrap();

    let mut first = input.push(1).unwrap();
    let held = stuck.next().await.unwrap().unwrap();
    assert_eq!(held.state, 1);

    // The engine waits on the stalled subscriber, so it never asks for more.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut first)
            .await
            .is_err()
    );

    // Coming back for the next change releases everything.
    let second = input.push(2).unwrap();
    let next = stuck.next().await.unwrap().unwrap();
    assert_eq!(next.state, 3);
    first.await.unwrap();
    drop(second);
}

#[tokio::test]
async fn leaving_mid_round_releases_the_engine() {
    let engine = Engine::with_config(0, adder(), quiet_config("leave"));
    let mut stuck = engine.subscribe().changes;
    let steady = tokio::spawn(drain(engine.subscribe().changes));
    let (input, source) = bridge();
    engine.start(source).unwrap();

    let mut first = input.push(1).unwrap();
    assert_eq!(stuck.next().await.unwrap().unwrap().state, 1);
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut first)
            .await
            .is_err()
    );

    stuck.unsubscribe();
    first.await.unwrap();

    input.send(2).await.unwrap();
    input.close();

    let (changes, error) = steady.await.unwrap();
    assert!(error.is_none());
    assert_eq!(changes.iter().map(|c| c.state).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(engine.terminated().await, EngineStatus::Ended);
}

// ============================================================================
// Terminal propagation
// ============================================================================

#[tokio::test]
async fn input_failure_reaches_every_subscriber_once() {
    let engine = Engine::with_config(0, adder(), quiet_config("failing-input"));
    let subscribers: Vec<_> = (0..3)
        .map(|_| tokio::spawn(drain(engine.subscribe().changes)))
        .collect();

    let error = StreamError::upstream("feed lost");
    engine
        .start(events_then_error([1, 2], error.clone()))
        .unwrap();

    for subscriber in subscribers {
        let (changes, terminal) = subscriber.await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(terminal, Some(error.clone()));
    }
    assert_eq!(engine.terminated().await, EngineStatus::Failed(error));
}

#[tokio::test]
async fn rejected_change_fails_the_engine_for_everyone() {
    let engine = Engine::with_config(0, adder(), quiet_config("reject"));
    let mut picky = engine.subscribe().changes;
    let other = tokio::spawn(drain(engine.subscribe().changes));
    let (input, source) = bridge();
    engine.start(source).unwrap();

    let delivery = input.push(7).unwrap();
    let change = picky.next().await.unwrap().unwrap();
    assert!(picky.reject(format!("cannot handle {}", change.event)));

    let EngineStatus::Failed(error) = engine.terminated().await else {
        panic!("engine should fail on a rejected change");
    };
    assert_eq!(error.kind(), "delivery");

    let (_, terminal) = other.await.unwrap();
    assert_eq!(terminal, Some(error.clone()));
    assert_eq!(picky.next().await, Some(Err(error)));

    // The stopped engine drops its input; the event it was folding counts as taken.
    assert_eq!(delivery.await, Ok(()));
    assert!(input.push(8).is_err());
}

#[tokio::test]
async fn reducer_failure_stops_before_the_bad_event() {
    let engine = Engine::spawn(5, adder(), events([1, 0, 1]), quiet_config("zero"));
    assert_eq!(
        engine.terminated().await,
        EngineStatus::Failed(StreamError::Reduction("zero step".to_string()))
    );
    assert_eq!(engine.current_state(), 6);
    assert_eq!(engine.position(), Position::new(1));
}

// ============================================================================
// Observability
// ============================================================================

#[tokio::test]
async fn observer_sees_the_engine_lifecycle() {
    let (config, observer) = recording_config("observed");
    let engine = Engine::with_config(0, adder(), config);
    let feed = engine.subscribe();
    engine.start(events([1, 2, 3])).unwrap();
    drain(feed.changes).await;
    engine.terminated().await;

    assert_eq!(observer.count(|r| matches!(r, Recorded::Reduced { .. })), 3);
    assert_eq!(
        observer.matching(|r| matches!(r, Recorded::EngineStopped { .. })),
        vec![Recorded::EngineStopped {
            component: "observed".to_string(),
            position: Position::new(3),
            error: None,
        }]
    );
    assert!(observer.records().contains(&Recorded::Subscribed {
        component: "observed.changes".to_string(),
        subscribers: 1,
    }));
}

#[tokio::test]
async fn default_config_traces_the_fold() {
    init_test_tracing();
    let engine = Engine::with_config(0, adder(), EngineConfig::default().with_label("traced"));
    let feed = engine.subscribe();
    engine.start(events_then_error([2, 3], StreamError::upstream("feed dropped"))).unwrap();

    let (changes, error) = drain(feed.changes).await;
    assert_eq!(changes.len(), 2);
    assert_eq!(error, Some(StreamError::upstream("feed dropped")));
    assert_eq!(engine.current_state(), 5);
}
