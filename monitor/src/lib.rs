//! notetodo monitor - todo extraction and deduplication for plain-text notes.
//!
//! This crate turns note files into structured todo records, keeps them in a
//! persisted store, and merges todos suggested by a language model into that
//! store without duplicating what the notes already say.
//!
//! # Overview
//!
//! Explicit markers (`- [ ] task`, `TODO: task`, ...) are found by the
//! [`classifier`] and turned into records by the [`extract`] engine. Every
//! rescan of a note replaces that note's marker records wholesale. Inferred todos
//! come from an [`inference`] provider and pass through the [`reconcile`]
//! step, which drops candidates that exactly or nearly repeat an existing
//! todo before they are appended to the [`store`].
//!
//! # Modules
//!
//! - [`types`]: Todo record types and their serialized shape
//! - [`identity`]: Injectable clock and identity generation
//! - [`classifier`]: Line classifier for explicit todo markers
//! - [`extract`]: Whole-document extraction engine
//! - [`reconcile`]: Duplicate suppression for inferred todos
//! - [`store`]: Todo store and persistence backends
//! - [`inference`]: Inference provider seam and HTTP client
//! - [`watcher`]: Notes directory watcher and scanner
//! - [`service`]: Scan, infer and mutate flows over a shared store
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations
//! - [`utils`]: Shared utilities (debouncing)

pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod inference;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;
pub mod watcher;

pub use classifier::classify;
pub use config::{Config, InferenceConfig};
pub use error::{MonitorError, Result};
pub use extract::Extractor;
pub use inference::{HttpInferenceClient, InferenceError, InferenceErrorKind, InferenceProvider};
pub use reconcile::{reconcile, similarity, ReconcileOutcome, ReconcilePolicy};
pub use service::{FileSource, FsSource, ScanSummary, TodoService};
pub use store::{JsonFileBackend, MemoryBackend, StoreBackend, StoreError, TodoStore};
pub use types::{Confidence, FileGroup, RecordPatch, TodoOrigin, TodoRecord, TodoStatus};
pub use utils::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
pub use watcher::{scan_note_files, NoteEvent, NoteWatcher, WatcherError};
