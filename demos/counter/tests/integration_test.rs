//! Integration tests for the counter demo
//!
//! These run the ticker-driven engine end to end.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use counter::{CounterEvent, CounterReducer, CounterState, ticker};
use proptest::prelude::*;
use std::time::Duration;
use streamfold_core::{Position, Reducer};
use streamfold_runtime::{Engine, EngineStatus};
use streamfold_testing::helpers::{drain, quiet_config};

#[tokio::test]
async fn late_subscriber_starts_from_the_current_count() {
    let engine = Engine::with_config(CounterState::default(), CounterReducer, quiet_config("counter"));
    let early = tokio::spawn(drain(engine.subscribe().changes));
    engine.start(ticker(Duration::from_millis(5), Some(10))).unwrap();

    tokio::time::sleep(Duration::from_millis(22)).await;
    let late = engine.subscribe();
    let joined_at = late.current_state.count;
    let late = tokio::spawn(drain(late.changes));

    assert_eq!(engine.terminated().await, EngineStatus::Ended);

    let (early, _) = early.await.unwrap();
    let counts: Vec<_> = early.iter().map(|c| c.state.count).collect();
    assert_eq!(counts, (1..=10).collect::<Vec<_>>());

    let (late, _) = late.await.unwrap();
    let counts: Vec<_> = late.iter().map(|c| c.state.count).collect();
    assert_eq!(counts, (joined_at + 1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn ticker_stops_when_the_engine_goes_away() {
    let engine = Engine::with_config(CounterState::default(), CounterReducer, quiet_config("short"));
    let mut feed = engine.subscribe().changes;
    engine.start(ticker(Duration::from_millis(1), None)).unwrap();

    // Take a few ticks, then fail the engine by rejecting one.
    for _ in 0..3 {
        futures::StreamExt::next(&mut feed).await.unwrap().unwrap();
    }
    feed.reject("enough");

    let EngineStatus::Failed(error) = engine.terminated().await else {
        panic!("a rejected change should fail the engine");
    };
    assert_eq!(error.kind(), "delivery");
    assert_eq!(engine.position(), Position::new(3));
}

proptest! {
    #[test]
    fn count_is_never_negative(events in prop::collection::vec(
        prop_oneof![
            Just(CounterEvent::Increment),
            Just(CounterEvent::Decrement),
            Just(CounterEvent::Reset),
        ],
        0..50,
    )) {
        let mut state = CounterState::default();
        for event in &events {
            let mut next = state;
            if CounterReducer.reduce(&mut next, event).is_ok() {
                state = next;
            }
            prop_assert!(state.count >= 0);
        }
    }
}
