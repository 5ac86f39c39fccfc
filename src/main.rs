use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use desk_sync::{
    config::SyncConfig,
    event::SyncEvent,
    model::{SessionId, StoredSession, StreamSnapshot},
    notify::{Notification, Notifier},
    paths::Paths,
    persistence::{FileStorage, PersistenceAdapter},
    session::SessionStore,
    store::EventCounts,
    sync::ChatSync,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "desk-sync", version, about = "Inspect and replay persisted agent desktop sessions")]
struct Cli {
    /// Storage directory (default: ~/.local/share/desk-sync)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List persisted sessions
    Sessions,

    /// Print a session's events and per-action counts
    Show { id: String },

    /// Feed a JSONL file of stream snapshots into a new session
    Replay {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete one session
    Delete { id: String },

    /// Remove all persisted sessions
    Clear,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("desk_sync=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = Paths::resolve(cli.data_dir.as_deref()).with_config(cli.config.as_deref());
    let config = SyncConfig::load(&paths.config)?;

    let (notifier, notices) = Notifier::channel();
    let storage = FileStorage::new(&paths.data_dir).with_quota(config.storage_quota_bytes);
    let adapter = PersistenceAdapter::new(storage, &config, notifier);

    let result = run(cli.command, adapter, &config);

    // Notices are user-facing; print them even when the command failed.
    for notice in notices.try_iter() {
        eprintln!("{}", describe(&notice));
    }
    result
}

fn run(command: Command, mut adapter: PersistenceAdapter, config: &SyncConfig) -> Result<()> {
    match command {
        Command::Sessions => {
            let sessions = adapter.load();
            if sessions.is_empty() {
                println!("no sessions");
            }
            for stored in &sessions {
                let s = &stored.session;
                println!(
                    "{}  {:<30}  {:>4} msgs  {:>4} events  {}",
                    s.id,
                    s.name,
                    s.message_ids.len(),
                    s.event_ids.len(),
                    s.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Command::Show { id } => {
            let stored = adapter
                .load_one(&parse_id(&id)?)
                .ok_or_else(|| eyre!("session {id} not found"))?;
            print_session(&stored);
        }

        Command::Replay { file, name } => {
            let content = fs::read_to_string(&file).wrap_err_with(|| format!("failed to read {}", file.display()))?;

            let mut sync = ChatSync::new(SessionStore::load(adapter), config);
            sync.handle(SyncEvent::CreateSession { name, sandbox_id: None })?;

            for (n, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let snapshot: StreamSnapshot =
                    serde_json::from_str(line).wrap_err_with(|| format!("{}:{}", file.display(), n + 1))?;
                sync.handle(SyncEvent::StreamUpdated {
                    snapshot,
                    at: Instant::now(),
                })?;
            }
            sync.handle(SyncEvent::Flush)?;

            let state = sync.store().state();
            if let Some(session) = sync.sessions().active_session() {
                println!("session {}  {}", session.id, session.name);
            }
            println!("agent status: {}", state.agent_status.as_str());
            print_counts(&state.counts);
        }

        Command::Delete { id } => {
            if !adapter.delete(&parse_id(&id)?)? {
                return Err(eyre!("session {id} not found"));
            }
            println!("deleted {id}");
        }

        Command::Clear => {
            adapter.clear()?;
            println!("cleared all sessions");
        }
    }
    Ok(())
}

fn parse_id(id: &str) -> Result<SessionId> {
    if id.trim().is_empty() {
        return Err(eyre!("session id cannot be empty"));
    }
    Ok(SessionId::new(id.trim()))
}

fn print_session(stored: &StoredSession) {
    let s = &stored.session;
    println!("{}  {}", s.id, s.name);
    if let Some(sandbox) = &s.sandbox_id {
        println!("sandbox: {sandbox}");
    }
    println!("messages: {}", stored.messages.len());
    if stored.events.is_empty() && !s.event_ids.is_empty() {
        println!("({} events, details removed to save space)", s.event_ids.len());
    }
    for event in &stored.events {
        let duration = event
            .duration
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_default();
        println!(
            "  {}  {:<16} {:<9} {}",
            event.id,
            event.action_kind().as_str(),
            event.status.as_str(),
            duration
        );
        if let Some(error) = &event.error {
            println!("      error: {error}");
        }
    }
    print_counts(&EventCounts::tally(&stored.events));
}

fn print_counts(counts: &EventCounts) {
    for (kind, count) in counts.iter().filter(|(_, count)| *count > 0) {
        println!("  {:<16} {count}", kind.as_str());
    }
    println!("  {:<16} {}", "total", counts.total());
}

fn describe(notice: &Notification) -> String {
    match notice {
        Notification::StorageQuotaWarning { message } => format!("warning: {message}"),
        Notification::StorageQuotaError { message } => format!("error: {message}"),
        Notification::RateLimitExceeded { countdown, message } => {
            format!("rate limited ({message}); retrying in {countdown}s")
        }
        Notification::SandboxRecovered { sandbox_id } => format!("sandbox replaced by {sandbox_id}"),
        Notification::SandboxError { message } => format!("sandbox error: {message}"),
    }
}
