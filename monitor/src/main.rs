//! notetodo - todo extraction for plain-text and markdown notes.
//!
//! This binary scans a notes directory for todo markers, keeps the results in
//! a persisted store, and can ask a language model for implicit todos.
//!
//! # Commands
//!
//! - `notetodo scan`: Scan the notes directory once and print the todos
//! - `notetodo watch`: Scan, then rescan notes as they change
//! - `notetodo infer <FILE>`: Add inferred todos for one note
//! - `notetodo list`: Print stored todos
//! - `notetodo set-status <ID> <STATUS>`: Change a todo's status
//! - `notetodo delete <ID>` / `notetodo clear`: Remove todos
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notetodo_monitor::config::Config;
use notetodo_monitor::extract::Extractor;
use notetodo_monitor::identity::{NamespacedIds, SystemClock};
use notetodo_monitor::inference::HttpInferenceClient;
use notetodo_monitor::service::{FsSource, TodoService};
use notetodo_monitor::store::{JsonFileBackend, MemoryBackend, StoreBackend, TodoStore};
use notetodo_monitor::types::{FileGroup, TodoOrigin, TodoRecord, TodoStatus};
use notetodo_monitor::watcher::{NoteEvent, NoteWatcher};

/// Capacity of the note event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// notetodo - todo extraction for plain-text and markdown notes.
///
/// Finds checkbox and TODO:/DONE:/IN PROGRESS: markers in notes, tracks them
/// in a local store, and merges model-suggested todos without duplicates.
#[derive(Parser, Debug)]
#[command(name = "notetodo")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    NOTETODO_NOTES_DIR               Notes directory (default: current directory)
    NOTETODO_STORE_PATH              Store file (default: <data dir>/notetodo/todos.json)
    NOTETODO_EXTENSIONS              Note extensions (default: md,markdown,txt)
    NOTETODO_DEBOUNCE_MS             Rescan quiet window (default: 500)
    NOTETODO_INFERENCE_URL           OpenAI-compatible base URL
    NOTETODO_INFERENCE_MODEL         Model name (default: gpt-4o-mini)
    NOTETODO_API_KEY                 Inference credential
    NOTETODO_INFERENCE_TIMEOUT_SECS  Inference timeout (default: 30)
    NOTETODO_DEDUP_WITHIN_BATCH      Dedup inferred todos against each other

EXAMPLES:
    # Scan ~/notes once
    notetodo scan --dir ~/notes

    # Keep the store in sync while editing
    notetodo watch --dir ~/notes

    # Ask the model for implicit todos in one note
    export NOTETODO_API_KEY=sk-...
    notetodo infer ~/notes/today.md

    # Mark a todo done
    notetodo set-status 3f0c... completed
")]
struct Cli {
    /// Keep todos in memory only; nothing is read from or written to the store file.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Scan every note once and print the todos found.
    Scan {
        /// Notes directory (overrides NOTETODO_NOTES_DIR).
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Scan every note, then rescan notes as they change until interrupted.
    Watch {
        /// Notes directory (overrides NOTETODO_NOTES_DIR).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Ask the inference provider for implicit todos in one note.
    Infer {
        /// The note to analyse.
        file: PathBuf,
    },

    /// Print stored todos grouped by note.
    List {
        /// Only show todos of this note.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Change the status of a todo.
    SetStatus {
        /// Todo identity, as printed by `list`.
        id: String,

        /// New status.
        #[arg(value_parser = parse_status)]
        status: TodoStatus,
    },

    /// Delete one todo.
    Delete {
        /// Todo identity, as printed by `list`.
        id: String,
    },

    /// Delete every stored todo.
    Clear,
}

fn parse_status(s: &str) -> std::result::Result<TodoStatus, String> {
    TodoStatus::parse(s)
        .ok_or_else(|| format!("expected one of pending, in-progress, completed; got '{s}'"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let service = build_service(&config, cli.ephemeral)?;

    match cli.command {
        Command::Scan { dir, json } => {
            let notes_dir = resolve_notes_dir(dir, &config)?;
            let summary = service
                .scan_directory(&notes_dir, &config.extensions)
                .await
                .with_context(|| format!("Failed to scan {}", notes_dir.display()))?;

            let groups = service.grouped().await;
            if json {
                print_json(&groups)?;
            } else {
                print_groups(&groups);
                println!(
                    "{} todos in {} notes ({} unreadable, {} removed)",
                    summary.todos_found,
                    summary.files_scanned,
                    summary.files_failed,
                    summary.files_removed
                );
            }
            Ok(())
        }
        Command::Watch { dir } => {
            let notes_dir = resolve_notes_dir(dir, &config)?;
            run_watch(&service, &config, notes_dir).await
        }
        Command::Infer { file } => {
            let file = resolve_note_path(&file)?;
            let outcome = service
                .infer_file(&file)
                .await
                .with_context(|| format!("Inference failed for {}", file.display()))?;

            for record in &outcome.accepted {
                print_record(record);
            }
            println!(
                "{} inferred todos added, {} duplicates skipped",
                outcome.accepted_count, outcome.skipped_count
            );
            Ok(())
        }
        Command::List { file, json } => {
            let groups = match file {
                Some(file) => {
                    let file = resolve_note_path(&file)?;
                    service
                        .grouped()
                        .await
                        .into_iter()
                        .filter(|g| Path::new(&g.file_path) == file)
                        .collect()
                }
                None => service.grouped().await,
            };

            if json {
                print_json(&groups)?;
            } else if groups.is_empty() {
                println!("No todos.");
            } else {
                print_groups(&groups);
            }
            Ok(())
        }
        Command::SetStatus { id, status } => {
            if !service.set_status(&id, status).await? {
                bail!("No todo with id {id}");
            }
            println!("{id} -> {status}");
            Ok(())
        }
        Command::Delete { id } => {
            if !service.delete(&id).await? {
                bail!("No todo with id {id}");
            }
            println!("Deleted {id}");
            Ok(())
        }
        Command::Clear => {
            service.clear().await?;
            println!("Cleared all todos.");
            Ok(())
        }
    }
}

/// Wires the store, extractor, file source and inference client together.
fn build_service(config: &Config, ephemeral: bool) -> Result<TodoService> {
    let backend: Box<dyn StoreBackend> = if ephemeral {
        Box::new(MemoryBackend::new())
    } else {
        Box::new(JsonFileBackend::new(config.store_path.clone()))
    };

    let clock = Arc::new(SystemClock::new());
    let store = TodoStore::open(backend, clock.clone()).with_context(|| {
        format!("Failed to open todo store at {}", config.store_path.display())
    })?;

    info!(
        store_path = %config.store_path.display(),
        ephemeral,
        records = store.len(),
        "Todo store loaded"
    );

    let extractor = Extractor::new(clock, Arc::new(NamespacedIds::new()));
    let client = HttpInferenceClient::new(config.inference.clone())
        .context("Failed to create inference client")?;

    Ok(TodoService::new(store, extractor, Arc::new(FsSource))
        .with_inference(Arc::new(client), config.inference.timeout)
        .with_policy(config.reconcile_policy))
}

fn resolve_notes_dir(dir: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    let dir = dir.unwrap_or_else(|| config.notes_dir.clone());
    dir.canonicalize()
        .with_context(|| format!("Notes directory {} is not accessible", dir.display()))
}

/// Resolves a note path to the key form used by scans, which start from a
/// canonical notes directory. Paths of deleted notes stay merely absolute.
fn resolve_note_path(file: &Path) -> Result<PathBuf> {
    file.canonicalize()
        .or_else(|_| std::path::absolute(file))
        .with_context(|| format!("Failed to resolve {}", file.display()))
}

/// Scans once, then applies note events until a shutdown signal arrives.
async fn run_watch(service: &TodoService, config: &Config, notes_dir: PathBuf) -> Result<()> {
    let summary = service
        .scan_directory(&notes_dir, &config.extensions)
        .await
        .with_context(|| format!("Failed to scan {}", notes_dir.display()))?;

    let (event_tx, mut event_rx) = mpsc::channel::<NoteEvent>(EVENT_CHANNEL_CAPACITY);
    let _watcher = NoteWatcher::new(
        notes_dir.clone(),
        config.extensions.clone(),
        config.debounce,
        event_tx,
    )
    .with_context(|| format!("Failed to watch {}", notes_dir.display()))?;

    info!(
        notes_dir = %notes_dir.display(),
        todos = summary.todos_found,
        "Watching notes. Press Ctrl+C to stop."
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            event = event_rx.recv() => {
                let Some(event) = event else {
                    warn!("Note watcher stopped");
                    break;
                };
                service.handle_event(event).await;
            }
        }
    }

    info!("Watcher stopped");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn print_groups(groups: &[FileGroup]) {
    for group in groups {
        println!("{}  ({})", group.display_name, group.file_path);
        for record in &group.records {
            print_record(record);
        }
        println!();
    }
}

fn print_record(record: &TodoRecord) {
    let checkbox = match record.status {
        TodoStatus::Pending => "[ ]",
        TodoStatus::InProgress => "[~]",
        TodoStatus::Completed => "[x]",
    };
    let origin = match (record.origin, record.confidence) {
        (TodoOrigin::Inferred, Some(confidence)) => {
            format!("  (inferred, {confidence})")
        }
        (TodoOrigin::Inferred, None) => "  (inferred)".to_string(),
        (TodoOrigin::Marker, _) => String::new(),
    };

    println!(
        "  {checkbox} {:>4}  {}{origin}  [{}]",
        record.line_number, record.text, record.identity
    );
}

/// Initializes the tracing subscriber; logs go to stderr so stdout stays parseable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
