use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use council_client::audio::{AudioBackendConfig, AudioBackendFactory, AudioCapturer, AudioFile, AudioSource};
use council_client::{
    AssistantMessage, Config, ConversationSession, ConversationStore, CouncilClient, FileStore,
    Message, SessionConfig, SessionUpdate, TurnOutcome,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "council-client")]
#[command(about = "Consult an LLM council and keep a local copy of every conversation")]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/council-client")]
    config: String,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List stored conversations, newest first
    List,
    /// Create an empty conversation
    New,
    /// Print a stored conversation
    Show { id: String },
    /// Delete a stored conversation
    Delete { id: String },
    /// Models offered by the council service
    Models,
    /// Check that the council service is reachable
    Health,
    /// Ask the council a question
    Ask {
        /// Continue this conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<String>,

        /// Go straight to the council without a clarification round
        #[arg(long)]
        skip_clarification: bool,

        text: Vec<String>,
    },
    /// Record from the microphone and transcribe
    Record {
        /// Seconds to record (Ctrl+C stops early)
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// Conversation to send the transcript to
        #[arg(long)]
        conversation: Option<String>,

        /// Send the transcript as a message
        #[arg(long)]
        send: bool,

        /// Also write the recording to this WAV file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Transcribe a WAV file
    Transcribe { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = Config::load(&cli.config)?;

    let data_dir = cfg.storage.resolved_data_dir()?;
    let kv = FileStore::open(&data_dir, &cfg.storage.namespace).await?;
    let store = ConversationStore::new(Arc::new(kv));
    info!("Conversations stored in {}", data_dir.display());

    let client = Arc::new(CouncilClient::new(
        cfg.service.base_url.clone(),
        Duration::from_secs(cfg.service.request_timeout_secs),
    )?);

    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_updates(store.clone(), updates_rx));

    let mut session = ConversationSession::new(SessionConfig::from(&cfg), store.clone(), client.clone())
        .with_updates(updates_tx);

    match cli.command {
        Command::List => {
            let index = store.list().await;
            if index.is_empty() {
                println!("No conversations yet");
            }
            for entry in index {
                println!(
                    "{}  {}  {} ({} messages)",
                    entry.id, entry.created_at, entry.title, entry.message_count
                );
            }
        }

        Command::New => {
            let conversation = session.new_conversation().await?;
            println!("{}", conversation.id);
        }

        Command::Show { id } => {
            let conversation = session.open_conversation(&id).await?;
            println!("# {}\n", conversation.title);
            for message in &conversation.messages {
                match message {
                    Message::User { content } => println!("> {}\n", content),
                    Message::Assistant(msg) => print_assistant(msg),
                }
            }
        }

        Command::Delete { id } => {
            session.delete_conversation(&id).await?;
            println!("Deleted {}", id);
        }

        Command::Models => {
            let models = session.available_models().await?;
            println!("Chairman (default): {}", models.default_chairman_model);
            println!("Council (default): {}", models.default_council_models.join(", "));
            println!("Available:");
            for model in models.available_models {
                println!("  {}", model);
            }
        }

        Command::Health => {
            let health = client.health().await?;
            println!("{}: {}", health.service, health.status);
        }

        Command::Ask {
            conversation,
            skip_clarification,
            text,
        } => {
            select_conversation(&mut session, conversation.as_deref()).await?;
            let outcome = session.send_message(&text.join(" "), skip_clarification).await?;
            finish_turn(&mut session, outcome).await?;
        }

        Command::Record {
            seconds,
            conversation,
            send,
            out,
        } => {
            let backend_config = AudioBackendConfig {
                block_size: cfg.audio.block_size,
                device: cfg.audio.device.clone(),
            };
            let backend = AudioBackendFactory::create(AudioSource::Microphone, backend_config)?;
            let capturer = AudioCapturer::new(backend);

            capturer.start().await?;
            println!("Recording for up to {}s, press Ctrl+C to stop early", seconds);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => info!("Stopped early"),
            }

            let recording = capturer.stop().await?;

            if let Some(path) = out {
                tokio::fs::write(&path, recording.to_wav())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Recording saved to {}", path.display());
            }

            let transcript = session.transcribe(&recording).await?;
            println!("{}", transcript);

            if send {
                select_conversation(&mut session, conversation.as_deref()).await?;
                let outcome = session.send_transcript(&transcript).await?;
                finish_turn(&mut session, outcome).await?;
            }
        }

        Command::Transcribe { file } => {
            let recording = AudioFile::open(&file)?.into_recording();
            let transcript = session.transcribe(&recording).await?;
            println!("{}", transcript);
        }
    }

    drop(session);
    let _ = renderer.await;

    Ok(())
}

async fn select_conversation(session: &mut ConversationSession, id: Option<&str>) -> Result<()> {
    let conversation = match id {
        Some(id) => session.open_conversation(id).await?,
        None => session.new_conversation().await?,
    };
    info!("Conversation {}", conversation.id);
    Ok(())
}

/// Answer clarification rounds from stdin until the turn completes, then print the result
async fn finish_turn(session: &mut ConversationSession, mut outcome: TurnOutcome) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while let TurnOutcome::ClarificationNeeded(clarification) = outcome {
        println!("The council needs more context:");
        for question in &clarification.questions {
            println!("  - {}", question);
        }
        println!("Answer (empty line to skip):");

        let answer = stdin.next_line().await?.unwrap_or_default();
        outcome = if answer.trim().is_empty() {
            session.skip_clarification().await?
        } else {
            session.send_message(&answer, false).await?
        };
    }

    if let Some(msg) = session.current().and_then(|c| c.last_assistant()) {
        print_assistant(msg);
    }

    Ok(())
}

/// Print stage progress as the persisted assistant message changes
async fn render_updates(store: ConversationStore, mut updates: mpsc::UnboundedReceiver<SessionUpdate>) {
    let mut previous = AssistantMessage::default();

    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::MessageUpdated { conversation_id, index } => {
                let Some(conversation) = store.get(&conversation_id).await else {
                    continue;
                };
                let Some(msg) = conversation.messages.get(index).and_then(Message::as_assistant) else {
                    continue;
                };
                print_progress(&previous, msg);
                previous = msg.clone();
            }
            SessionUpdate::TitleChanged { title, .. } => println!("# {}", title),
            SessionUpdate::TurnFinished(_) => previous = AssistantMessage::default(),
            SessionUpdate::TurnRolledBack { reason, .. } => {
                warn!("Turn failed and was rolled back: {}", reason);
                previous = AssistantMessage::default();
            }
            SessionUpdate::IndexRefreshed(_) | SessionUpdate::ClarificationNeeded(_) => {}
        }
    }
}

fn print_progress(before: &AssistantMessage, after: &AssistantMessage) {
    let stages = [
        ("Clarification", before.loading.clarification, after.loading.clarification),
        ("Stage 1: collecting responses", before.loading.stage1, after.loading.stage1),
        ("Stage 2: peer rankings", before.loading.stage2, after.loading.stage2),
        ("Stage 3: chairman synthesis", before.loading.stage3, after.loading.stage3),
    ];

    for (label, was_loading, is_loading) in stages {
        match (was_loading, is_loading) {
            (false, true) => println!("{}...", label),
            (true, false) => println!("{} done", label),
            _ => {}
        }
    }
}

fn print_assistant(msg: &AssistantMessage) {
    if let Some(clarification) = &msg.clarification {
        if clarification.needs_clarification {
            println!("Clarification requested:");
            for question in &clarification.questions {
                println!("  - {}", question);
            }
        }
    }

    if let Some(Value::Array(responses)) = &msg.stage1 {
        let models: Vec<&str> = responses
            .iter()
            .filter_map(|r| r.get("model").and_then(Value::as_str))
            .collect();
        println!("Stage 1: {} responses ({})", responses.len(), models.join(", "));
    }

    if let Some(Value::Array(rankings)) = msg
        .metadata
        .as_ref()
        .and_then(|m| m.get("aggregate_rankings"))
    {
        println!("Stage 2: aggregate ranking");
        for (position, entry) in rankings.iter().enumerate() {
            let model = entry.get("model").and_then(Value::as_str).unwrap_or("?");
            println!("  {}. {}", position + 1, model);
        }
    }

    if let Some(stage3) = &msg.stage3 {
        let model = stage3.get("model").and_then(Value::as_str).unwrap_or("chairman");
        let response = stage3
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| stage3.to_string());
        println!("\nFinal answer ({}):\n{}\n", model, response);
    }
}
