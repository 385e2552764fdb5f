use anyhow::{bail, Context, Result};
use chatline::controller::ReplyStatus;
use chatline::view::{MessageElement, MessageId, Role};
use chatline::{config, ChatController, ViewListener};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use shared::api::Rating;
use shared::events::RecordId;
use shared::ChatError;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chatline", version, about = "Streaming chat client")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    send: SendArgs,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Model id, overrides the preset
    #[arg(long)]
    model: Option<String>,
    /// Preset slot (fast, smart, reasoning, vision, ...)
    #[arg(long)]
    preset: Option<String>,
    /// Continue an existing conversation
    #[arg(long)]
    conversation: Option<String>,
    /// Image file to attach; repeatable
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    /// PDF file to attach
    #[arg(long)]
    pdf: Option<PathBuf>,
    /// Print reasoning text as it streams
    #[arg(long)]
    show_reasoning: bool,
    message: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List models and their attachment support
    Models,
    /// List stored conversations
    Conversations,
    /// Create a share link for a conversation
    Share { conversation: String },
    /// Rate an assistant message
    Rate {
        message: String,
        #[arg(value_enum)]
        rating: RatingArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RatingArg {
    Up,
    Down,
}

impl From<RatingArg> for Rating {
    fn from(r: RatingArg) -> Self {
        match r {
            RatingArg::Up => Rating::Up,
            RatingArg::Down => Rating::Down,
        }
    }
}

/// Prints the new tail of each assistant message as it grows.
struct TerminalView {
    show_reasoning: bool,
    printed: Mutex<HashMap<MessageId, (usize, usize)>>,
}

impl TerminalView {
    fn new(show_reasoning: bool) -> Self {
        Self {
            show_reasoning,
            printed: Mutex::new(HashMap::new()),
        }
    }
}

impl ViewListener for TerminalView {
    fn message_updated(&self, message: &MessageElement) {
        if message.role != Role::Assistant {
            return;
        }
        let mut printed = self.printed.lock();
        let (reasoning_seen, content_seen) = printed.entry(message.id).or_default();
        let mut out = std::io::stdout().lock();

        if let Some(region) = message.reasoning.as_ref().filter(|_| self.show_reasoning) {
            if *reasoning_seen == 0 && !region.text.is_empty() {
                let _ = write!(out, "[thinking] ");
            }
            if let Some(tail) = region.text.get(*reasoning_seen..) {
                let _ = write!(out, "{}", tail);
            }
            *reasoning_seen = region.text.len();
        }

        let content = message.content_text();
        if let Some(tail) = content.get(*content_seen..) {
            if *content_seen == 0 && !content.is_empty() && *reasoning_seen > 0 {
                let _ = writeln!(out);
            }
            let _ = write!(out, "{}", tail);
        }
        *content_seen = content.len();
        let _ = out.flush();
    }
}

fn record_id(raw: &str) -> RecordId {
    raw.parse::<i64>()
        .map(RecordId::Number)
        .unwrap_or_else(|_| RecordId::Text(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = config::load_settings(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Models) => {
            let controller = ChatController::new(settings)?;
            for model in controller.refresh_models().await? {
                let mut caps = Vec::new();
                if model.supports_images {
                    caps.push("images");
                }
                if model.supports_pdf {
                    caps.push("pdf");
                }
                if model.supports_reasoning {
                    caps.push("reasoning");
                }
                println!("{:<24} {:<28} {}", model.id, model.name, caps.join(", "));
            }
            Ok(())
        }
        Some(Command::Conversations) => {
            let controller = ChatController::new(settings)?;
            for conv in controller.list_conversations().await? {
                let updated = conv
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{:<38} {:<17} {}", conv.id, updated, conv.title);
            }
            Ok(())
        }
        Some(Command::Share { conversation }) => {
            let controller = ChatController::new(settings)?;
            controller.store().set_conversation(Some(conversation));
            match controller.share().await? {
                Some(link) => println!("{}", link.url),
                None => bail!("no conversation to share"),
            }
            Ok(())
        }
        Some(Command::Rate { message, rating }) => {
            let controller = ChatController::new(settings)?;
            controller.rate(&record_id(&message), rating.into()).await?;
            Ok(())
        }
        None => send(settings, cli.send).await,
    }
}

async fn send(settings: shared::settings::ClientSettings, args: SendArgs) -> Result<()> {
    let text = args.message.join(" ");
    if text.trim().is_empty() {
        bail!("nothing to send; pass a message");
    }

    let view = Arc::new(TerminalView::new(args.show_reasoning));
    let controller = Arc::new(ChatController::new(settings)?.with_listener(view));

    if let Some(slot) = args.preset.as_deref() {
        controller.select_preset(slot)?;
    }
    if let Some(model) = args.model.as_deref() {
        controller.select_model(model);
    }
    if let Some(id) = args.conversation {
        controller.store().set_conversation(Some(id));
    }
    {
        let mut attachments = controller.attachments();
        for path in &args.images {
            attachments
                .add_file(path)
                .with_context(|| format!("attaching {}", path.display()))?;
        }
        if let Some(path) = &args.pdf {
            attachments
                .add_file(path)
                .with_context(|| format!("attaching {}", path.display()))?;
        }
    }

    let on_interrupt = Arc::clone(&controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = match controller.send(&text).await {
        Ok(outcome) => outcome,
        Err(e @ ChatError::Capability { .. }) => {
            let slots: Vec<String> = controller
                .compatible_presets()
                .into_iter()
                .map(|p| p.slot)
                .collect();
            if !slots.is_empty() {
                eprintln!("presets that accept these attachments: {}", slots.join(", "));
            }
            return Err(e.into());
        }
        Err(e) if e.is_pre_dispatch() => return Err(e.into()),
        Err(e) => {
            println!();
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };
    println!();

    let log = controller.log();
    let log = log.lock();
    if let Some(reply) = log.get(outcome.reply) {
        if outcome.status == ReplyStatus::Cancelled {
            eprintln!("(cancelled)");
        }
        if let Some(footer) = &reply.footer {
            eprintln!("{}", footer);
        }
        if let Some(id) = &reply.server_id {
            eprintln!("message id: {}", id);
        }
    }
    if let Some(conversation) = controller.store().conversation_id() {
        eprintln!("conversation: {}", conversation);
    }
    Ok(())
}
