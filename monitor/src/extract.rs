//! Extraction engine: turns a note into marker-origin todo records.

use std::sync::Arc;

use tracing::debug;

use crate::classifier::classify;
use crate::identity::{Clock, IdGenerator, IdentitySeed, NamespacedIds, SystemClock};
use crate::types::{TodoOrigin, TodoRecord};

/// Runs the line classifier over whole documents.
///
/// Time and identity come from the injected [`Clock`] and [`IdGenerator`];
/// apart from those the extractor is a pure function of its inputs.
#[derive(Clone)]
pub struct Extractor {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor").finish_non_exhaustive()
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()), Arc::new(NamespacedIds::new()))
    }
}

impl Extractor {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn ids(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }

    /// Extracts every marker todo from `document`, in line order.
    ///
    /// All records of one call share the same `created_at`/`updated_at`
    /// instant and get a fresh identity each.
    ///
    /// # Example
    ///
    /// ```
    /// use notetodo_monitor::extract::Extractor;
    /// use notetodo_monitor::types::{TodoOrigin, TodoStatus};
    ///
    /// let records = Extractor::default().extract("/notes/a.md", "intro\n- [x] done\nTODO: next\n");
    ///
    /// assert_eq!(records.len(), 2);
    /// assert_eq!(records[0].line_number, 2);
    /// assert_eq!(records[0].status, TodoStatus::Completed);
    /// assert_eq!(records[1].text, "next");
    /// assert!(records.iter().all(|r| r.origin == TodoOrigin::Marker));
    /// ```
    #[must_use]
    pub fn extract(&self, file_path: &str, document: &str) -> Vec<TodoRecord> {
        let lines: Vec<&str> = document.lines().collect();
        let now = self.clock.now();

        let records: Vec<TodoRecord> = lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| classify(line, index, &lines))
            .map(|candidate| TodoRecord {
                identity: self.ids.generate(IdentitySeed {
                    file_path,
                    line_number: candidate.line_number,
                    discovered_at: now,
                    batch_index: None,
                }),
                text: candidate.text,
                status: candidate.status,
                file_path: file_path.to_string(),
                line_number: candidate.line_number,
                created_at: now,
                updated_at: now,
                origin: TodoOrigin::Marker,
                confidence: None,
                surrounding_text: candidate.surrounding_text,
            })
            .collect();

        debug!(
            file_path = %file_path,
            line_count = lines.len(),
            todo_count = records.len(),
            "Extracted marker todos"
        );

        records
    }
}
