//! Notes directory watcher.
//!
//! Watches a notes directory recursively and emits a [`NoteEvent`] whenever a
//! note file changes or disappears. Only files whose extension is in the
//! configured list are reported.
//!
//! # Architecture
//!
//! The notify callback stays lightweight: it drops notes inside hidden
//! directories, classifies the raw event and queues it on an unbounded
//! internal channel. A dedicated async task owns a
//! per-path [`Debouncer`], so bursts of saves to one note collapse into a
//! single [`NoteEvent::Changed`] after the quiet window, while removals are
//! forwarded immediately as [`NoteEvent::Removed`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use notetodo_monitor::watcher::{NoteEvent, NoteWatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let extensions = vec!["md".to_string()];
//!     let _watcher = NoteWatcher::new(PathBuf::from("/home/me/notes"), extensions, Duration::from_millis(500), tx)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             NoteEvent::Changed(path) => println!("rescan {}", path.display()),
//!             NoteEvent::Removed(path) => println!("forget {}", path.display()),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::utils::Debouncer;

/// Events emitted by the note watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    /// A note was created or modified and has been quiet for the debounce window.
    Changed(PathBuf),

    /// A note was removed or renamed away.
    Removed(PathBuf),
}

impl NoteEvent {
    /// The note path this event refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Changed(path) | Self::Removed(path) => path,
        }
    }
}

/// Raw events from the notify callback, before debouncing.
#[derive(Debug, PartialEq, Eq)]
enum InternalEvent {
    Touched(PathBuf),
    Removed(PathBuf),
}

/// Errors that can occur during note watching and scanning.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// Failed to read a directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The notes directory does not exist or is not a directory.
    #[error("notes directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Recursive watcher over a notes directory.
///
/// Dropping the watcher ends the subscription; pending debounced changes are
/// flushed to the event channel as the processing task winds down.
#[derive(Debug)]
pub struct NoteWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
}

impl NoteWatcher {
    /// Starts watching `notes_dir` for notes with one of `extensions`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or the file system
    /// watcher cannot be initialized.
    pub fn new(
        notes_dir: PathBuf,
        extensions: Vec<String>,
        debounce: Duration,
        event_sender: mpsc::Sender<NoteEvent>,
    ) -> Result<Self> {
        if !notes_dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(notes_dir));
        }

        // Unbounded so a burst never drops a removal; touches are coalesced
        // by the debouncer downstream.
        let (internal_tx, internal_rx) = mpsc::unbounded_channel::<InternalEvent>();

        tokio::spawn(async move {
            process_internal_events(internal_rx, debounce, event_sender).await;
        });

        let watcher = create_watcher(internal_tx, notes_dir.clone(), extensions)?;

        info!(
            notes_dir = %notes_dir.display(),
            debounce_ms = debounce.as_millis(),
            "Initialized note watcher"
        );

        Ok(Self { watcher })
    }
}

fn create_watcher(
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    notes_dir: PathBuf,
    extensions: Vec<String>,
) -> Result<RecommendedWatcher> {
    let root = notes_dir.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            handle_notify_event(res, &root, &extensions, &internal_tx);
        },
        Config::default(),
    )?;

    watcher.watch(&notes_dir, RecursiveMode::Recursive)?;

    debug!(notes_dir = %notes_dir.display(), "Started recursive note watch");

    Ok(watcher)
}

/// Classifies a notify event and queues it without blocking the notify thread.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    notes_dir: &Path,
    extensions: &[String],
    internal_tx: &mpsc::UnboundedSender<InternalEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    for path in &event.paths {
        if !has_note_extension(path, extensions) {
            continue;
        }

        if in_hidden_directory(path, notes_dir) {
            trace!(path = %path.display(), "Ignoring note in hidden directory");
            continue;
        }

        let Some(internal_event) = classify_event(&event.kind, path) else {
            trace!(kind = ?event.kind, path = %path.display(), "Ignoring event kind");
            continue;
        };

        if internal_tx.send(internal_event).is_err() {
            debug!("Note event processor stopped, dropping event");
        }
    }
}

/// Returns true if a directory between `notes_dir` and `path` is hidden.
///
/// Paths outside `notes_dir` are never considered hidden.
fn in_hidden_directory(path: &Path, notes_dir: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(notes_dir) else {
        return false;
    };
    relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .any(|component| is_hidden_name(component.as_os_str()))
}

fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn classify_event(kind: &EventKind, path: &Path) -> Option<InternalEvent> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            Some(InternalEvent::Touched(path.to_path_buf()))
        }
        EventKind::Remove(RemoveKind::File | RemoveKind::Any) => {
            Some(InternalEvent::Removed(path.to_path_buf()))
        }
        // Editors commonly save through a rename; which side of it this path
        // is on only shows in whether it still exists.
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                Some(InternalEvent::Touched(path.to_path_buf()))
            } else {
                Some(InternalEvent::Removed(path.to_path_buf()))
            }
        }
        _ => None,
    }
}

async fn process_internal_events(
    mut rx: mpsc::UnboundedReceiver<InternalEvent>,
    debounce: Duration,
    sender: mpsc::Sender<NoteEvent>,
) {
    let (debounced_tx, mut debounced_rx) = mpsc::channel::<(PathBuf, ())>(1000);
    let mut debouncer = Some(Debouncer::new(debounce, debounced_tx));

    loop {
        tokio::select! {
            event = rx.recv(), if debouncer.is_some() => {
                match event {
                    Some(InternalEvent::Touched(path)) => {
                        if let Some(debouncer) = &debouncer {
                            trace!(path = %path.display(), "Debouncing note change");
                            if debouncer.send(path, ()).await.is_err() {
                                warn!("Debouncer closed, dropping note change");
                            }
                        }
                    }
                    Some(InternalEvent::Removed(path)) => {
                        info!(path = %path.display(), "Note removed");
                        if sender.send(NoteEvent::Removed(path)).await.is_err() {
                            debug!("Note event receiver dropped");
                            break;
                        }
                    }
                    None => {
                        // Dropping the debouncer flushes whatever is still pending.
                        debouncer = None;
                    }
                }
            }

            debounced = debounced_rx.recv() => {
                let Some((path, ())) = debounced else {
                    break;
                };
                debug!(path = %path.display(), "Note changed");
                if sender.send(NoteEvent::Changed(path)).await.is_err() {
                    debug!("Note event receiver dropped");
                    break;
                }
            }
        }
    }

    debug!("Note event processor shutting down");
}

/// Returns true if `path` has one of `extensions` (case-insensitive, no dot).
#[must_use]
pub fn has_note_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Lists every note under `dir` with one of `extensions`, sorted by path.
///
/// Hidden directories (such as `.git`) are not descended into, and
/// directories that cannot be read for lack of permission are skipped with a
/// warning.
///
/// # Errors
///
/// Returns an error if `dir` does not exist or cannot be read.
pub fn scan_note_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(WatcherError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    scan_directory_recursive(dir, extensions, &mut files)?;
    files.sort();

    info!(dir = %dir.display(), file_count = files.len(), "Scanned note files");

    Ok(files)
}

fn scan_directory_recursive(dir: &Path, extensions: &[String], files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(dir = %dir.display(), "Permission denied, skipping directory");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if path.file_name().is_some_and(is_hidden_name) {
                trace!(dir = %path.display(), "Skipping hidden directory");
                continue;
            }
            scan_directory_recursive(&path, extensions, files)?;
        } else if has_note_extension(&path, extensions) {
            debug!(path = %path.display(), "Found note file");
            files.push(path);
        }
    }

    Ok(())
}
