//! Todo record types shared by the extraction, reconciliation and storage layers.
//!
//! [`TodoRecord`] is also the persistence schema: every field serializes under
//! its camelCase name, enums serialize to the lowercase strings the
//! presentation layer expects, and timestamps are epoch milliseconds.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Finished.
    Completed,
}

impl TodoStatus {
    /// Parses the serialized form of a status.
    ///
    /// # Example
    ///
    /// ```
    /// use notetodo_monitor::types::TodoStatus;
    ///
    /// assert_eq!(TodoStatus::parse("in-progress"), Some(TodoStatus::InProgress));
    /// assert_eq!(TodoStatus::parse("done"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns the serialized form of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a todo came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoOrigin {
    /// Explicit marker syntax in the note (checkbox, `TODO:`, ...).
    Marker,
    /// Suggested by the inference provider.
    Inferred,
}

/// Confidence attached to an inferred todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Returns the serialized form of the confidence.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoRecord {
    /// Unique, immutable identity within the store.
    pub identity: String,

    /// Task description with marker syntax stripped.
    pub text: String,

    pub status: TodoStatus,

    /// Path of the source note.
    pub file_path: String,

    /// 1-indexed line at extraction time.
    pub line_number: u32,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,

    pub origin: TodoOrigin,

    /// Only present on [`TodoOrigin::Inferred`] records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,

    /// Neighbouring lines joined with ` | `. Display and matching context only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surrounding_text: Option<String>,
}

/// Output of the line classifier for a single matching line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoCandidate {
    pub text: String,
    pub status: TodoStatus,
    /// 1-indexed line number.
    pub line_number: u32,
    pub surrounding_text: Option<String>,
}

/// A todo suggested by the inference provider, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredCandidate {
    pub text: String,
    pub line_number: i64,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Partial update applied by [`crate::store::TodoStore::update_record`].
///
/// `None` leaves the field untouched. Identity, origin, file path and
/// creation time are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub text: Option<String>,
    pub status: Option<TodoStatus>,
    pub line_number: Option<u32>,
    pub confidence: Option<Confidence>,
    pub surrounding_text: Option<Option<String>>,
}

impl RecordPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: TodoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Records of a single file, as consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    pub file_path: String,
    pub display_name: String,
    pub records: Vec<TodoRecord>,
}

/// Returns the final path segment after splitting on `/` or `\`.
///
/// # Example
///
/// ```
/// use notetodo_monitor::types::display_name;
///
/// assert_eq!(display_name("/home/me/notes/today.md"), "today.md");
/// assert_eq!(display_name(r"C:\notes\work.txt"), "work.txt");
/// assert_eq!(display_name("plain.md"), "plain.md");
/// ```
#[must_use]
pub fn display_name(file_path: &str) -> String {
    file_path
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_path)
        .to_string()
}

/// Canonical string key for a note path.
///
/// Records are keyed by this string so that persisted and freshly scanned
/// records compare equal.
#[must_use]
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
