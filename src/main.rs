use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use mindstash_assistant::{
    ApiClient, AssistantConfig, AssistantSession, AssistantSignal, AssistantStore, ChatBackend,
    Role, ToolCallState,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mindstash_assistant=debug")),
        )
        .init();

    let config = AssistantConfig::load();
    tracing::info!("MindStash backend: {}", config.api_base_url);
    if config.api_token.is_none() {
        tracing::warn!(
            "No API token configured; requests will fail unless the backend runs without auth"
        );
    }

    let backend: Arc<dyn ChatBackend> = Arc::new(ApiClient::new(
        config.api_base_url.clone(),
        config.api_token.clone(),
    ));
    let store = AssistantStore::new(&config.database_path)?;
    let (signal_tx, signal_rx) = flume::unbounded();
    let mut session = AssistantSession::new(backend, store, config, signal_tx);

    session.restore_history().await;
    if !session.messages().is_empty() {
        println!("--- restored conversation ---");
        print_messages(session.messages());
        println!("-----------------------------");
    }

    session.maybe_send_briefing().await;
    drain_signals(&signal_rx);

    println!("Type a message, /clear to reset the conversation, /quit to exit.");
    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                session.clear_chat();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let before = session.messages().len();
        session.send_message(line, false).await?;
        print_messages(&session.messages()[before..]);
        drain_signals(&signal_rx);
    }

    Ok(())
}

fn print_messages(messages: &[mindstash_assistant::ChatMessage]) {
    for message in messages {
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        for call in &message.tool_calls {
            let status = match call.state {
                ToolCallState::Running => "...",
                ToolCallState::Done => "ok",
                ToolCallState::Error => "failed",
            };
            println!("  [{}] {} ({})", call.tool, call.message, status);
        }
        println!("{}> {}", speaker, message.content);
    }
}

fn drain_signals(signal_rx: &flume::Receiver<AssistantSignal>) {
    while let Ok(signal) = signal_rx.try_recv() {
        match signal {
            AssistantSignal::ItemCachesStale => {
                tracing::info!("Items changed server-side; dashboard caches should refresh");
            }
        }
    }
}
