//! End-to-end tests for the chat demo

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chat::{ChatChannel, ChatEvent, ChatLine, ChatOutput, ChatReducer, ChatState, NameChange, conversation};
use streamfold_core::{Position, StreamError};
use streamfold_runtime::{EngineStatus, SplitEngine};
use streamfold_testing::helpers::{drain, events, quiet_config};

fn name_change(old: Option<&str>, new: &str) -> ChatOutput {
    ChatOutput::NameChange(NameChange {
        old: old.map(str::to_string),
        new: new.to_string(),
    })
}

fn chat_line(message: &str, name: &str, aka: &[&str]) -> ChatOutput {
    ChatOutput::ChatLine(ChatLine {
        message: message.to_string(),
        name: name.to_string(),
        aka: aka.iter().map(|a| (*a).to_string()).collect(),
    })
}

#[tokio::test]
async fn conversation_splits_into_renames_and_lines() {
    let engine = SplitEngine::with_config(ChatState::default(), ChatReducer, quiet_config("chat"));
    let renames = tokio::spawn(drain(engine.subscribe(ChatChannel::NameChanges)));
    let lines = tokio::spawn(drain(engine.subscribe(ChatChannel::ChatLines)));

    engine.start(events(conversation("abcdef"))).unwrap();

    assert_eq!(
        renames.await.unwrap(),
        (
            vec![name_change(None, "geon"), name_change(Some("geon"), "neon")],
            None
        )
    );
    assert_eq!(
        lines.await.unwrap(),
        (
            vec![
                chat_line("hello", "geon", &[]),
                chat_line("world", "neon", &["geon"])
            ],
            None
        )
    );
    assert_eq!(engine.terminated().await, EngineStatus::Ended);
    assert_eq!(engine.position(), Position::new(4));
}

#[tokio::test]
async fn a_stranger_fails_both_channels() {
    let engine = SplitEngine::with_config(ChatState::default(), ChatReducer, quiet_config("strangers"));
    let renames = tokio::spawn(drain(engine.subscribe(ChatChannel::NameChanges)));
    let lines = tokio::spawn(drain(engine.subscribe(ChatChannel::ChatLines)));

    engine
        .start(events([
            ChatEvent::set_name("u1", "ada"),
            ChatEvent::message("u2", "hi"),
        ]))
        .unwrap();

    let error = StreamError::Reduction("User does not exist: u2".to_string());
    assert_eq!(
        renames.await.unwrap(),
        (vec![name_change(None, "ada")], Some(error.clone()))
    );
    assert_eq!(lines.await.unwrap(), (vec![], Some(error.clone())));
    assert_eq!(engine.terminated().await, EngineStatus::Failed(error));
}
