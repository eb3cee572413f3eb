//! Todo store keyed by record identity, with whole-collection persistence.
//!
//! # Design
//!
//! - **Explicit ownership**: the store is a plain value constructed by the
//!   composition root and shared behind a lock; there is no global instance.
//!
//! - **Atomic mutations**: every mutating operation builds the next record
//!   collection, hands it to the [`StoreBackend`], and only swaps it in after
//!   the backend accepted it. A failed save leaves the store exactly as it was.
//!
//! - **Read-only views**: [`TodoStore::records_for_file`] and
//!   [`TodoStore::grouped_by_file`] return sorted copies and never mutate.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use notetodo_monitor::extract::Extractor;
//! use notetodo_monitor::identity::SystemClock;
//! use notetodo_monitor::store::{MemoryBackend, TodoStore};
//!
//! let mut store = TodoStore::open(Box::new(MemoryBackend::new()), Arc::new(SystemClock::new())).unwrap();
//! let records = Extractor::default().extract("/notes/a.md", "TODO: one\n- [ ] two");
//!
//! store.replace_marker_records_for_file("/notes/a.md", records).unwrap();
//!
//! let groups = store.grouped_by_file();
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].display_name, "a.md");
//! assert_eq!(groups[0].records.len(), 2);
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::Clock;
use crate::types::{display_name, FileGroup, RecordPatch, TodoOrigin, TodoRecord};

/// Version written into persisted documents.
const STORE_FORMAT_VERSION: u32 = 1;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the persistence slot failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document could not be parsed.
    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the record collection failed.
    #[error("failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted document was written by an incompatible format version.
    #[error("unsupported store format version {found} in {path}, expected {expected}", expected = STORE_FORMAT_VERSION)]
    UnsupportedVersion { path: PathBuf, found: u32 },

    /// A record with this identity is already stored (or repeated in the input).
    #[error("duplicate record identity: {0}")]
    DuplicateIdentity(String),

    /// A record passed for one file belongs to another.
    #[error("record {identity} belongs to {found}, expected {expected}")]
    FileMismatch {
        identity: String,
        expected: String,
        found: String,
    },

    /// Only marker records may be passed to a marker replace.
    #[error("record {0} is not a marker record")]
    NotAMarker(String),

    /// The persistence backend is unusable (e.g. a poisoned lock).
    #[error("store backend unavailable: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable slot holding the whole record collection.
pub trait StoreBackend: Send + Sync {
    /// Reads the whole collection. A slot that was never written is empty.
    fn load(&self) -> Result<Vec<TodoRecord>>;

    /// Replaces the whole collection.
    fn save(&self, records: &[TodoRecord]) -> Result<()>;
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    version: u32,
    todos: &'a [TodoRecord],
}

#[derive(Deserialize)]
struct StoreDocument {
    version: u32,
    todos: Vec<TodoRecord>,
}

/// JSON file backend.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the target,
/// so readers only ever see a complete document.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "todos.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<TodoRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No store file yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: StoreDocument =
            serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if document.version != STORE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                found: document.version,
            });
        }

        Ok(document.todos)
    }

    fn save(&self, records: &[TodoRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_vec_pretty(&StoreDocumentRef {
            version: STORE_FORMAT_VERSION,
            todos: records,
        })?;

        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            records = records.len(),
            "Persisted todo store"
        );

        Ok(())
    }
}

/// In-process backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Vec<TodoRecord>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `records`.
    #[must_use]
    pub fn with_records(records: Vec<TodoRecord>) -> Self {
        Self {
            slot: Mutex::new(records),
        }
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<TodoRecord>> {
        self.slot
            .lock()
            .map(|slot| slot.clone())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn save(&self, records: &[TodoRecord]) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        *slot = records.to_vec();
        Ok(())
    }
}

impl<B: StoreBackend + ?Sized> StoreBackend for Arc<B> {
    fn load(&self) -> Result<Vec<TodoRecord>> {
        (**self).load()
    }

    fn save(&self, records: &[TodoRecord]) -> Result<()> {
        (**self).save(records)
    }
}

/// Mapping from identity to record, grouped into per-file views on demand.
pub struct TodoStore {
    records: HashMap<String, TodoRecord>,
    backend: Box<dyn StoreBackend>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TodoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoStore")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl TodoStore {
    /// Loads the store from `backend`.
    ///
    /// Records repeating an identity already loaded are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or its contents are corrupt.
    pub fn open(backend: Box<dyn StoreBackend>, clock: Arc<dyn Clock>) -> Result<Self> {
        let loaded = backend.load()?;
        let total = loaded.len();

        let mut records = HashMap::with_capacity(total);
        for record in loaded {
            if records.contains_key(&record.identity) {
                warn!(identity = %record.identity, "Dropping persisted record with duplicate identity");
                continue;
            }
            records.insert(record.identity.clone(), record);
        }

        info!(records = records.len(), dropped = total - records.len(), "Opened todo store");

        Ok(Self {
            records,
            backend,
            clock,
        })
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a record by identity.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&TodoRecord> {
        self.records.get(identity)
    }

    /// Every stored record, ordered by file path then line number.
    #[must_use]
    pub fn all_records(&self) -> Vec<TodoRecord> {
        let mut all: Vec<TodoRecord> = self.records.values().cloned().collect();
        all.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.line_number.cmp(&b.line_number))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.identity.cmp(&b.identity))
        });
        all
    }

    /// Records of one file, ordered by ascending line number.
    #[must_use]
    pub fn records_for_file(&self, file_path: &str) -> Vec<TodoRecord> {
        let mut records: Vec<TodoRecord> = self
            .records
            .values()
            .filter(|r| r.file_path == file_path)
            .cloned()
            .collect();
        sort_by_line(&mut records);
        records
    }

    /// One group per distinct file path, ordered by path, each sorted by line.
    #[must_use]
    pub fn grouped_by_file(&self) -> Vec<FileGroup> {
        let mut groups: HashMap<&str, Vec<TodoRecord>> = HashMap::new();
        for record in self.records.values() {
            groups
                .entry(record.file_path.as_str())
                .or_default()
                .push(record.clone());
        }

        let mut groups: Vec<FileGroup> = groups
            .into_iter()
            .map(|(file_path, mut records)| {
                sort_by_line(&mut records);
                FileGroup {
                    file_path: file_path.to_string(),
                    display_name: display_name(file_path),
                    records,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        groups
    }

    /// Replaces the marker records of `file_path` with `new_records`.
    ///
    /// Inferred records of the file, and every record of other files, are
    /// kept as they are.
    ///
    /// # Errors
    ///
    /// Returns an error (leaving the store unchanged) if a new record belongs
    /// to another file or is not a marker record, if identities collide, or
    /// if persisting fails.
    pub fn replace_marker_records_for_file(
        &mut self,
        file_path: &str,
        new_records: Vec<TodoRecord>,
    ) -> Result<()> {
        let mut next: HashMap<String, TodoRecord> = self
            .records
            .iter()
            .filter(|(_, r)| r.file_path != file_path || r.origin == TodoOrigin::Inferred)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        let removed = self.records.len() - next.len();
        let inserted = new_records.len();

        for record in new_records {
            if record.file_path != file_path {
                return Err(StoreError::FileMismatch {
                    identity: record.identity,
                    expected: file_path.to_string(),
                    found: record.file_path,
                });
            }
            if record.origin != TodoOrigin::Marker {
                return Err(StoreError::NotAMarker(record.identity));
            }
            insert_unique(&mut next, record)?;
        }

        self.commit(next)?;

        debug!(file_path = %file_path, removed, inserted, "Replaced marker records");
        Ok(())
    }

    /// Removes every record of `file_path`, whatever its origin.
    ///
    /// Returns how many records were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn remove_records_for_file(&mut self, file_path: &str) -> Result<usize> {
        let next: HashMap<String, TodoRecord> = self
            .records
            .iter()
            .filter(|(_, r)| r.file_path != file_path)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        let removed = self.records.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }

        self.commit(next)?;

        debug!(file_path = %file_path, removed, "Removed file records");
        Ok(removed)
    }

    /// Inserts `records` without touching existing ones.
    ///
    /// # Errors
    ///
    /// Returns an error (leaving the store unchanged) if any identity is
    /// already stored or repeated, or if persisting fails.
    pub fn append_records(&mut self, records: Vec<TodoRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut next = self.records.clone();
        let count = records.len();
        for record in records {
            insert_unique(&mut next, record)?;
        }

        self.commit(next)?;

        debug!(appended = count, "Appended records");
        Ok(count)
    }

    /// Applies `patch` to the record with `identity` and bumps `updated_at`.
    ///
    /// Returns `Ok(false)` if no such record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn update_record(&mut self, identity: &str, patch: RecordPatch) -> Result<bool> {
        let Some(current) = self.records.get(identity) else {
            return Ok(false);
        };

        let mut updated = current.clone();
        if let Some(text) = patch.text {
            updated.text = text;
        }
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(line_number) = patch.line_number {
            updated.line_number = line_number.max(1);
        }
        if let Some(confidence) = patch.confidence {
            updated.confidence = Some(confidence);
        }
        if let Some(surrounding_text) = patch.surrounding_text {
            updated.surrounding_text = surrounding_text;
        }
        updated.updated_at = self.clock.now().max(updated.created_at);

        let mut next = self.records.clone();
        next.insert(identity.to_string(), updated);
        self.commit(next)?;

        debug!(identity = %identity, "Updated record");
        Ok(true)
    }

    /// Removes the record with `identity`. Returns `Ok(false)` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn delete_record(&mut self, identity: &str) -> Result<bool> {
        if !self.records.contains_key(identity) {
            return Ok(false);
        }

        let mut next = self.records.clone();
        next.remove(identity);
        self.commit(next)?;

        debug!(identity = %identity, "Deleted record");
        Ok(true)
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn clear_all(&mut self) -> Result<()> {
        self.commit(HashMap::new())?;
        info!("Cleared todo store");
        Ok(())
    }

    fn commit(&mut self, next: HashMap<String, TodoRecord>) -> Result<()> {
        let mut snapshot: Vec<TodoRecord> = next.values().cloned().collect();
        snapshot.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.line_number.cmp(&b.line_number))
                .then(a.identity.cmp(&b.identity))
        });
        self.backend.save(&snapshot)?;
        self.records = next;
        Ok(())
    }
}

fn insert_unique(map: &mut HashMap<String, TodoRecord>, record: TodoRecord) -> Result<()> {
    if map.contains_key(&record.identity) {
        return Err(StoreError::DuplicateIdentity(record.identity));
    }
    map.insert(record.identity.clone(), record);
    Ok(())
}

fn sort_by_line(records: &mut [TodoRecord]) {
    records.sort_by(|a, b| {
        a.line_number
            .cmp(&b.line_number)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.identity.cmp(&b.identity))
    });
}
