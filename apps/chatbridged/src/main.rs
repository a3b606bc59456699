use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chatbridge_adapters::{BridgeBuilder, BridgeConfig, InboundTrigger, ScriptedChatModel};
use chatbridge_bus::BroadcastPublisher;
use chatbridge_protocol::ConversationState;
use clap::{Parser, ValueEnum};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chatbridged")]
#[command(about = "chatbridge demo daemon")]
struct Cli {
    /// JSON bridge configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "Tell me something about message buses")]
    message: String,
    #[arg(long, default_value = "demo-conversation")]
    conversation_id: String,
    #[arg(long, default_value = "demo-chat")]
    chat_id: String,
    #[arg(long, default_value = "developer")]
    user_id: String,
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path).await?,
        None => BridgeConfig::default(),
    };

    let hub = BroadcastPublisher::new(256);
    let mut envelopes = hub.subscribe_stream();
    let envelope_task = tokio::spawn(async move {
        while let Some(item) = envelopes.next().await {
            match item {
                Ok(published) => {
                    let rendered = serde_json::to_string(&published.envelope)
                        .unwrap_or_else(|_| "{}".to_owned());
                    info!(channel = %published.channel, envelope = %rendered, "envelope.published");
                }
                Err(error) => warn!(%error, "envelope subscriber lagged"),
            }
        }
    });

    let reply = format!(
        "You asked: {}. Envelopes stream one fragment at a time.",
        cli.message.trim()
    );
    let bridge = BridgeBuilder::new(config, Arc::new(hub.clone()))
        .chat_model(Arc::new(ScriptedChatModel::from_text(&reply)))
        .build()?;
    info!(
        provider_id = %bridge.provider_id(),
        output = %bridge.output().channel(),
        "bridge ready"
    );

    let trigger = json!({
        "message": cli.message,
        "sessionId": cli.conversation_id,
        "chatId": cli.chat_id,
        "userId": cli.user_id,
    });
    let parsed = InboundTrigger::from_value(trigger.clone())?;
    bridge
        .publish_state(&parsed, ConversationState::Thinking, None)
        .await?;

    let outcome = bridge.handle_chat_trigger(trigger).await?;
    info!(
        model = %outcome.model,
        fragments = outcome.fragment_count,
        published = outcome.published,
        text = %outcome.full_text,
        "chat complete"
    );

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    envelope_task.abort();
    if let Err(error) = envelope_task.await
        && !error.is_cancelled()
    {
        warn!(%error, "envelope task stopped");
    }

    Ok(())
}
