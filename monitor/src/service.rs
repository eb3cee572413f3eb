//! Todo service: the flows that tie extraction, inference, reconciliation and
//! the store together.
//!
//! # Design
//!
//! - The store lives behind one async mutex, so mutations never interleave
//!   and a reader never observes a half-applied change.
//! - File reads and inference calls happen *outside* the store lock; only the
//!   final replace/append holds it.
//! - Inference for one file is serialized by a per-file lock, so two runs for
//!   the same note cannot both reconcile against the same snapshot and append
//!   duplicates of each other.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classifier::surrounding_context;
use crate::config::DEFAULT_INFERENCE_TIMEOUT_SECS;
use crate::error::{MonitorError, Result};
use crate::extract::Extractor;
use crate::identity::IdentitySeed;
use crate::inference::{InferenceError, InferenceProvider};
use crate::reconcile::{reconcile, ReconcileOutcome, ReconcilePolicy};
use crate::store::TodoStore;
use crate::types::{
    path_key, FileGroup, InferredCandidate, RecordPatch, TodoOrigin, TodoRecord, TodoStatus,
};
use crate::watcher::{scan_note_files, NoteEvent};

/// Source of note contents.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Returns the full current text of `path`.
    async fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads notes from the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

#[async_trait]
impl FileSource for FsSource {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Totals of a multi-file scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub files_scanned: usize,
    pub files_failed: usize,
    /// Notes that had records but no longer exist on disk.
    pub files_removed: usize,
    pub todos_found: usize,
}

/// Shared entry point for every todo operation.
pub struct TodoService {
    store: Arc<Mutex<TodoStore>>,
    extractor: Extractor,
    source: Arc<dyn FileSource>,
    inference: Option<Arc<dyn InferenceProvider>>,
    inference_timeout: Duration,
    policy: ReconcilePolicy,
    inference_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for TodoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoService")
            .field("inference", &self.inference.is_some())
            .field("inference_timeout", &self.inference_timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TodoService {
    /// Creates a service without an inference provider.
    #[must_use]
    pub fn new(store: TodoStore, extractor: Extractor, source: Arc<dyn FileSource>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            extractor,
            source,
            inference: None,
            inference_timeout: Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
            policy: ReconcilePolicy::default(),
            inference_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Enables [`infer_file`](Self::infer_file), bounding each call by `timeout`.
    #[must_use]
    pub fn with_inference(mut self, provider: Arc<dyn InferenceProvider>, timeout: Duration) -> Self {
        self.inference = Some(provider);
        self.inference_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Re-extracts `path` and replaces its records.
    ///
    /// Returns the number of todos found.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Read` if the note cannot be read, in which case
    /// the store is left untouched, or a store error if persisting fails.
    pub async fn scan_file(&self, path: &Path) -> Result<usize> {
        let key = path_key(path);

        let content = self.source.read(path).await.map_err(|source| {
            warn!(path = %path.display(), error = %source, "Failed to read note, keeping existing todos");
            MonitorError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let records = self.extractor.extract(&key, &content);
        let count = records.len();

        self.store
            .lock()
            .await
            .replace_marker_records_for_file(&key, records)?;

        info!(path = %path.display(), todos = count, "Scanned note");
        Ok(count)
    }

    /// Scans every path in turn. Failures are logged and counted, not returned.
    pub async fn scan_all(&self, paths: &[PathBuf]) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for path in paths {
            match self.scan_file(path).await {
                Ok(count) => {
                    summary.files_scanned += 1;
                    summary.todos_found += count;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Scan failed");
                    summary.files_failed += 1;
                }
            }
        }

        info!(
            files_scanned = summary.files_scanned,
            files_failed = summary.files_failed,
            todos_found = summary.todos_found,
            "Full scan complete"
        );
        summary
    }

    /// Scans every note under `dir` and forgets stored notes under `dir`
    /// that no longer exist.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be listed or a removal cannot be
    /// persisted. Individual unreadable notes only count as failures.
    pub async fn scan_directory(&self, dir: &Path, extensions: &[String]) -> Result<ScanSummary> {
        let files = scan_note_files(dir, extensions)?;
        let present: HashSet<String> = files.iter().map(|p| path_key(p)).collect();

        let stale: Vec<PathBuf> = self
            .grouped()
            .await
            .into_iter()
            .filter(|group| !present.contains(&group.file_path))
            .map(|group| PathBuf::from(group.file_path))
            .filter(|path| path.starts_with(dir) && !path.exists())
            .collect();

        for path in &stale {
            self.remove_file(path).await?;
        }

        let mut summary = self.scan_all(&files).await;
        summary.files_removed = stale.len();
        Ok(summary)
    }

    /// Drops every record of a deleted note. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisting fails.
    pub async fn remove_file(&self, path: &Path) -> Result<usize> {
        let key = path_key(path);
        let removed = self.store.lock().await.remove_records_for_file(&key)?;

        info!(path = %path.display(), removed, "Forgot removed note");
        Ok(removed)
    }

    /// Applies a watcher event, logging rather than returning failures.
    pub async fn handle_event(&self, event: NoteEvent) {
        let result = match &event {
            NoteEvent::Changed(path) => self.scan_file(path).await.map(|_| ()),
            NoteEvent::Removed(path) => self.remove_file(path).await.map(|_| ()),
        };

        if let Err(e) = result {
            debug!(path = %event.path().display(), error = %e, "Note event not applied");
        }
    }

    /// Asks the inference provider for implicit todos in `path` and appends
    /// the ones that do not duplicate the file's current records.
    ///
    /// # Errors
    ///
    /// - `MonitorError::InferenceUnavailable` without a provider
    /// - `MonitorError::Read` if the note cannot be read
    /// - `MonitorError::Inference` for a classified provider failure,
    ///   including [`InferenceError::Timeout`] when the bound is exceeded
    /// - A store error if persisting fails
    ///
    /// The store is untouched in every error case.
    pub async fn infer_file(&self, path: &Path) -> Result<ReconcileOutcome> {
        let provider = self
            .inference
            .as_ref()
            .ok_or(MonitorError::InferenceUnavailable)?;
        let key = path_key(path);

        let file_lock = self.inference_lock(&key);
        let result = {
            let _guard = file_lock.lock().await;
            self.infer_locked(provider.as_ref(), path, &key).await
        };
        drop(file_lock);
        self.release_inference_lock(&key);

        result
    }

    async fn infer_locked(
        &self,
        provider: &dyn InferenceProvider,
        path: &Path,
        key: &str,
    ) -> Result<ReconcileOutcome> {
        let content = self
            .source
            .read(path)
            .await
            .map_err(|source| MonitorError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let candidates = match tokio::time::timeout(self.inference_timeout, provider.infer(&content)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(path = %path.display(), timeout_secs = self.inference_timeout.as_secs(), "Inference timed out");
                return Err(InferenceError::Timeout {
                    after_secs: self.inference_timeout.as_secs(),
                }
                .into());
            }
        };

        let records = self.inferred_records(key, &content, candidates);

        let mut store = self.store.lock().await;
        let existing = store.records_for_file(key);
        let outcome = reconcile(key, &existing, records, self.policy);
        store.append_records(outcome.accepted.clone())?;
        drop(store);

        info!(
            path = %path.display(),
            accepted = outcome.accepted_count,
            skipped = outcome.skipped_count,
            "Reconciled inferred todos"
        );
        Ok(outcome)
    }

    fn inference_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .inference_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Forgets the lock of `key` once no other inference holds or awaits it.
    fn release_inference_lock(&self, key: &str) {
        let mut locks = self
            .inference_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Turns provider candidates into `Inferred` records sharing one timestamp.
    fn inferred_records(
        &self,
        file_path: &str,
        content: &str,
        candidates: Vec<InferredCandidate>,
    ) -> Vec<TodoRecord> {
        let lines: Vec<&str> = content.lines().collect();
        let now = self.extractor.clock().now();

        candidates
            .into_iter()
            .enumerate()
            .map(|(batch_index, candidate)| {
                let line_number = clamp_line_number(candidate.line_number);
                TodoRecord {
                    identity: self.extractor.ids().generate(IdentitySeed {
                        file_path,
                        line_number,
                        discovered_at: now,
                        batch_index: Some(batch_index),
                    }),
                    text: candidate.text.trim().to_string(),
                    status: TodoStatus::Pending,
                    file_path: file_path.to_string(),
                    line_number,
                    created_at: now,
                    updated_at: now,
                    origin: TodoOrigin::Inferred,
                    confidence: Some(candidate.confidence),
                    surrounding_text: surrounding_context(&lines, line_number as usize - 1),
                }
            })
            .collect()
    }

    /// Changes the status of one record.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisting fails.
    pub async fn set_status(&self, identity: &str, status: TodoStatus) -> Result<bool> {
        self.update(identity, RecordPatch::status(status)).await
    }

    /// Merges `patch` into one record. `Ok(false)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisting fails.
    pub async fn update(&self, identity: &str, patch: RecordPatch) -> Result<bool> {
        Ok(self.store.lock().await.update_record(identity, patch)?)
    }

    /// Deletes one record. `Ok(false)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisting fails.
    pub async fn delete(&self, identity: &str) -> Result<bool> {
        Ok(self.store.lock().await.delete_record(identity)?)
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisting fails.
    pub async fn clear(&self) -> Result<()> {
        Ok(self.store.lock().await.clear_all()?)
    }

    pub async fn grouped(&self) -> Vec<FileGroup> {
        self.store.lock().await.grouped_by_file()
    }

    pub async fn records_for_file(&self, path: &Path) -> Vec<TodoRecord> {
        self.store.lock().await.records_for_file(&path_key(path))
    }

    pub async fn all_records(&self) -> Vec<TodoRecord> {
        self.store.lock().await.all_records()
    }
}

/// Inferred line numbers are 1-indexed; anything below is pinned to line 1.
fn clamp_line_number(line_number: i64) -> u32 {
    u32::try_from(line_number.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::{FixedClock, SequentialIds};
    use crate::store::MemoryBackend;
    use crate::types::Confidence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory notes keyed by path.
    #[derive(Default)]
    struct MapSource {
        files: std::sync::Mutex<HashMap<PathBuf, String>>,
    }

    impl MapSource {
        fn set(&self, path: &str, content: &str) {
            self.files
                .lock()
                .unwrap()
                .insert(PathBuf::from(path), content.to_string());
        }

        fn remove(&self, path: &str) {
            self.files.lock().unwrap().remove(Path::new(path));
        }
    }

    #[async_trait]
    impl FileSource for MapSource {
        async fn read(&self, path: &Path) -> std::io::Result<String> {
            self.files.lock().unwrap().get(path).cloned().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such note")
            })
        }
    }

    /// Provider returning a fixed answer, optionally after a delay.
    struct ScriptedProvider {
        answer: std::result::Result<Vec<InferredCandidate>, InferenceError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(candidates: Vec<InferredCandidate>) -> Self {
            Self {
                answer: Ok(candidates),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn err(error: InferenceError) -> Self {
            Self {
                answer: Err(error),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn infer(&self, _document: &str) -> std::result::Result<Vec<InferredCandidate>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.answer.clone()
        }
    }

    fn candidate(text: &str, line_number: i64) -> InferredCandidate {
        InferredCandidate {
            text: text.to_string(),
            line_number,
            confidence: Confidence::Medium,
            reasoning: None,
        }
    }

    fn service(source: Arc<MapSource>) -> TodoService {
        let clock = Arc::new(FixedClock::at(1_000));
        let store = TodoStore::open(Box::new(MemoryBackend::new()), clock.clone()).unwrap();
        let extractor = Extractor::new(clock, Arc::new(SequentialIds::default()));
        TodoService::new(store, extractor, source)
    }

    const NOTE: &str = "groceries\n- [ ] buy milk\nTODO: call dentist\nshould email Sam\n";

    // =========================================================================
    // Scanning
    // =========================================================================

    #[tokio::test]
    async fn test_scan_replaces_file_records() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let svc = service(source.clone());

        assert_eq!(svc.scan_file(Path::new("/n/a.md")).await.unwrap(), 2);

        source.set("/n/a.md", "DONE: call dentist\n");
        assert_eq!(svc.scan_file(Path::new("/n/a.md")).await.unwrap(), 1);

        let records = svc.records_for_file(Path::new("/n/a.md")).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TodoStatus::Completed);
        assert_eq!(records[0].line_number, 1);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_existing_records() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let svc = service(source.clone());
        svc.scan_file(Path::new("/n/a.md")).await.unwrap();

        source.remove("/n/a.md");
        let err = svc.scan_file(Path::new("/n/a.md")).await.unwrap_err();

        assert!(matches!(err, MonitorError::Read { .. }));
        assert_eq!(svc.records_for_file(Path::new("/n/a.md")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_all_counts_failures() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        source.set("/n/b.md", "TODO: one");
        let svc = service(source);

        let summary = svc
            .scan_all(&[
                PathBuf::from("/n/a.md"),
                PathBuf::from("/n/missing.md"),
                PathBuf::from("/n/b.md"),
            ])
            .await;

        assert_eq!(
            summary,
            ScanSummary {
                files_scanned: 2,
                files_failed: 1,
                files_removed: 0,
                todos_found: 3,
            }
        );
        assert_eq!(svc.grouped().await.len(), 2);
    }

    #[tokio::test]
    async fn test_handle_event_routes_changes_and_removals() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let svc = service(source);

        svc.handle_event(NoteEvent::Changed(PathBuf::from("/n/a.md"))).await;
        assert_eq!(svc.all_records().await.len(), 2);

        svc.handle_event(NoteEvent::Removed(PathBuf::from("/n/a.md"))).await;
        assert!(svc.all_records().await.is_empty());
    }

    // =========================================================================
    // Inference
    // =========================================================================

    #[tokio::test]
    async fn test_infer_without_provider_is_unavailable() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let svc = service(source);

        let err = svc.infer_file(Path::new("/n/a.md")).await.unwrap_err();
        assert!(matches!(err, MonitorError::InferenceUnavailable));
    }

    #[tokio::test]
    async fn test_infer_appends_only_novel_candidates() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let provider = Arc::new(ScriptedProvider::ok(vec![
            candidate("Buy  Milk", 9),
            candidate("email Sam", 4),
        ]));
        let svc = service(source).with_inference(provider, Duration::from_secs(5));
        svc.scan_file(Path::new("/n/a.md")).await.unwrap();

        let outcome = svc.infer_file(Path::new("/n/a.md")).await.unwrap();
        assert_eq!(outcome.accepted_count, 1);
        assert_eq!(outcome.skipped_count, 1);

        let records = svc.records_for_file(Path::new("/n/a.md")).await;
        assert_eq!(records.len(), 3);
        let inferred = records
            .iter()
            .find(|r| r.origin == TodoOrigin::Inferred)
            .unwrap();
        assert_eq!(inferred.text, "email Sam");
        assert_eq!(inferred.line_number, 4);
        assert_eq!(inferred.status, TodoStatus::Pending);
        assert_eq!(inferred.confidence, Some(Confidence::Medium));
        assert_eq!(
            inferred.surrounding_text.as_deref(),
            Some("TODO: call dentist")
        );
    }

    #[tokio::test]
    async fn test_rescan_keeps_inferred_records() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let provider = Arc::new(ScriptedProvider::ok(vec![candidate("email Sam", 4)]));
        let svc = service(source).with_inference(provider, Duration::from_secs(5));
        let path = Path::new("/n/a.md");

        svc.scan_file(path).await.unwrap();
        svc.infer_file(path).await.unwrap();
        svc.scan_file(path).await.unwrap();

        let origins: Vec<TodoOrigin> = svc
            .records_for_file(path)
            .await
            .iter()
            .map(|r| r.origin)
            .collect();
        assert_eq!(
            origins,
            [TodoOrigin::Marker, TodoOrigin::Marker, TodoOrigin::Inferred]
        );

        assert_eq!(svc.remove_file(path).await.unwrap(), 3);
        assert!(svc.all_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_inference_locks_are_released() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let provider = Arc::new(ScriptedProvider {
            delay: Duration::from_millis(20),
            ..ScriptedProvider::ok(vec![candidate("email Sam", 4)])
        });
        let svc = Arc::new(service(source).with_inference(provider, Duration::from_secs(5)));

        let runs: Vec<_> = ["/n/a.md", "/n/a.md", "/n/missing.md"]
            .into_iter()
            .map(|path| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.infer_file(Path::new(path)).await.is_ok() })
            })
            .collect();
        for run in runs {
            run.await.unwrap();
        }

        assert!(svc.inference_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inferred_line_numbers_are_clamped() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", "first\nsecond");
        let provider = Arc::new(ScriptedProvider::ok(vec![candidate("plan trip", -3)]));
        let svc = service(source).with_inference(provider, Duration::from_secs(5));

        svc.infer_file(Path::new("/n/a.md")).await.unwrap();

        let records = svc.all_records().await;
        assert_eq!(records[0].line_number, 1);
        assert_eq!(records[0].surrounding_text.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_store_untouched() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let provider = Arc::new(ScriptedProvider::err(InferenceError::RateLimited {
            retry_after_secs: Some(3),
        }));
        let svc = service(source).with_inference(provider.clone(), Duration::from_secs(5));
        svc.scan_file(Path::new("/n/a.md")).await.unwrap();

        let err = svc.infer_file(Path::new("/n/a.md")).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Inference(InferenceError::RateLimited { .. })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.all_records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let provider = Arc::new(ScriptedProvider {
            delay: Duration::from_secs(5),
            ..ScriptedProvider::ok(vec![candidate("late", 1)])
        });
        let svc = service(source).with_inference(provider, Duration::from_millis(50));

        let err = svc.infer_file(Path::new("/n/a.md")).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Inference(InferenceError::Timeout { .. })
        ));
        assert!(svc.all_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_inference_for_one_file_does_not_duplicate() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let provider = Arc::new(ScriptedProvider {
            delay: Duration::from_millis(20),
            ..ScriptedProvider::ok(vec![candidate("email Sam", 4)])
        });
        let svc = Arc::new(service(source).with_inference(provider, Duration::from_secs(5)));

        let a = tokio::spawn({
            let svc = Arc::clone(&svc);
            async move { svc.infer_file(Path::new("/n/a.md")).await.unwrap() }
        });
        let b = tokio::spawn({
            let svc = Arc::clone(&svc);
            async move { svc.infer_file(Path::new("/n/a.md")).await.unwrap() }
        });

        let total = a.await.unwrap().accepted_count + b.await.unwrap().accepted_count;
        assert_eq!(total, 1);
        assert_eq!(svc.all_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_within_batch_policy_dedups_candidates() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", "x");
        let provider = Arc::new(ScriptedProvider::ok(vec![
            candidate("email Sam", 1),
            candidate("Email  sam", 1),
        ]));
        let svc = service(source)
            .with_inference(provider, Duration::from_secs(5))
            .with_policy(ReconcilePolicy::WithinBatch);

        let outcome = svc.infer_file(Path::new("/n/a.md")).await.unwrap();
        assert_eq!(outcome.accepted_count, 1);
        assert_eq!(outcome.skipped_count, 1);
    }

    // =========================================================================
    // Pass-through mutations
    // =========================================================================

    #[tokio::test]
    async fn test_status_update_delete_and_clear() {
        let source = Arc::new(MapSource::default());
        source.set("/n/a.md", NOTE);
        let svc = service(source);
        svc.scan_file(Path::new("/n/a.md")).await.unwrap();

        let id = svc.all_records().await[0].identity.clone();
        assert!(svc.set_status(&id, TodoStatus::Completed).await.unwrap());
        assert!(!svc.set_status("missing", TodoStatus::Completed).await.unwrap());
        assert_eq!(
            svc.all_records().await[0].status,
            TodoStatus::Completed
        );

        assert!(svc.delete(&id).await.unwrap());
        assert!(!svc.delete(&id).await.unwrap());

        svc.clear().await.unwrap();
        assert!(svc.grouped().await.is_empty());
    }

    #[test]
    fn test_clamp_line_number_bounds() {
        assert_eq!(clamp_line_number(-5), 1);
        assert_eq!(clamp_line_number(0), 1);
        assert_eq!(clamp_line_number(7), 7);
        assert_eq!(clamp_line_number(i64::MAX), u32::MAX);
    }
}
