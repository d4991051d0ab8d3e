//! Chat example binary
//!
//! Feeds a short conversation through a split engine and prints both derived
//! channels as they arrive.

use chat::{ChatChannel, ChatOutput, ChatReducer, ChatState, conversation};
use futures::StreamExt;
use std::time::Duration;
use streamfold_core::{Channel, StreamError};
use streamfold_runtime::{EngineConfig, SplitEngine, Subscription, adapt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn print_channel(channel: ChatChannel, mut outputs: Subscription<ChatOutput>) {
    while let Some(output) = outputs.next().await {
        match output {
            Ok(ChatOutput::NameChange(change)) => {
                println!("[{}] {:?} -> {}", channel.name(), change.old, change.new);
            },
            Ok(ChatOutput::ChatLine(line)) => {
                println!("[{}] {} (aka {:?}): {}", channel.name(), line.name, line.aka, line.message);
            },
            Err(error) => println!("[{}] failed: {error}", channel.name()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat=debug,streamfold_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Chat Example: derived channels ===\n");

    let engine = SplitEngine::with_config(
        ChatState::default(),
        ChatReducer,
        EngineConfig::default().with_label("chat"),
    );
    let printers: Vec<_> = [ChatChannel::NameChanges, ChatChannel::ChatLines]
        .into_iter()
        .map(|channel| tokio::spawn(print_channel(channel, engine.subscribe(channel))))
        .collect();

    let input = adapt(|sender| async move {
        for event in conversation("abcdef") {
            sender.send(event).await.map_err(StreamError::upstream)?;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    });
    engine.start(input)?;

    let status = engine.terminated().await;
    for printer in printers {
        printer.await?;
    }
    println!("\nEngine finished: {status:?} after {} events", engine.position());
    Ok(())
}
