//! Line classifier for explicit todo markers.
//!
//! A line yields at most one [`TodoCandidate`]. Rules are tried in priority
//! order and the first one that produces non-empty task text wins:
//!
//! | Priority | Syntax | Status |
//! |----------|--------|--------|
//! | 1 | `- [ ] text` / `* [ ] text` at the start of the trimmed line | `[ ]` pending, `[~]` in progress, `[x]`/`[X]` completed |
//! | 2 | `TODO:` anywhere (case-insensitive) | pending |
//! | 3 | `DONE:` anywhere (case-insensitive) | completed |
//! | 4 | `IN PROGRESS:` / `IN-PROGRESS:` anywhere (case-insensitive) | in progress |
//!
//! For the prefix rules the task text is the trimmed remainder after the
//! first occurrence of the prefix.
//!
//! # Example
//!
//! ```
//! use notetodo_monitor::classifier::classify;
//! use notetodo_monitor::types::TodoStatus;
//!
//! let lines = ["groceries", "- [~] buy milk", ""];
//! let candidate = classify(lines[1], 1, &lines).unwrap();
//!
//! assert_eq!(candidate.text, "buy milk");
//! assert_eq!(candidate.status, TodoStatus::InProgress);
//! assert_eq!(candidate.line_number, 2);
//! assert_eq!(candidate.surrounding_text.as_deref(), Some("groceries"));
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{TodoCandidate, TodoStatus};

/// Separator between context lines.
pub const CONTEXT_SEPARATOR: &str = " | ";

static CHECKBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*] +\[([ xX~])\] +(.+)$").expect("checkbox pattern is valid")
});

static PREFIX_RULES: LazyLock<[(Regex, TodoStatus); 3]> = LazyLock::new(|| {
    [
        (
            Regex::new(r"(?i)TODO:").expect("todo pattern is valid"),
            TodoStatus::Pending,
        ),
        (
            Regex::new(r"(?i)DONE:").expect("done pattern is valid"),
            TodoStatus::Completed,
        ),
        (
            Regex::new(r"(?i)IN[ -]PROGRESS:").expect("in-progress pattern is valid"),
            TodoStatus::InProgress,
        ),
    ]
});

/// Classifies one line of a document.
///
/// # Arguments
///
/// * `line` - The line to classify
/// * `line_index` - Zero-based index of `line` within `all_lines`
/// * `all_lines` - Every line of the document, used for context only
///
/// # Returns
///
/// `Some(TodoCandidate)` with a 1-indexed line number if the line carries a
/// todo marker, `None` otherwise.
#[must_use]
pub fn classify(line: &str, line_index: usize, all_lines: &[&str]) -> Option<TodoCandidate> {
    let (text, status) = match_marker(line.trim())?;

    Some(TodoCandidate {
        text,
        status,
        line_number: u32::try_from(line_index + 1).unwrap_or(u32::MAX),
        surrounding_text: surrounding_context(all_lines, line_index),
    })
}

/// Applies the marker rules to an already trimmed line.
fn match_marker(trimmed: &str) -> Option<(String, TodoStatus)> {
    if let Some(caps) = CHECKBOX.captures(trimmed) {
        let text = caps[2].trim();
        if !text.is_empty() {
            let status = match &caps[1] {
                "x" | "X" => TodoStatus::Completed,
                "~" => TodoStatus::InProgress,
                _ => TodoStatus::Pending,
            };
            return Some((text.to_string(), status));
        }
    }

    PREFIX_RULES.iter().find_map(|(pattern, status)| {
        let found = pattern.find(trimmed)?;
        let text = trimmed[found.end()..].trim();
        (!text.is_empty()).then(|| (text.to_string(), *status))
    })
}

/// Builds the one-line-before/after context for the line at `index`.
///
/// Neighbours outside the document and blank neighbours are skipped; the
/// remaining trimmed lines are joined with [`CONTEXT_SEPARATOR`] in document
/// order. Returns `None` when nothing survives.
///
/// # Example
///
/// ```
/// use notetodo_monitor::classifier::surrounding_context;
///
/// let lines = ["  before  ", "TODO: x", "after"];
/// assert_eq!(surrounding_context(&lines, 1).as_deref(), Some("before | after"));
/// assert_eq!(surrounding_context(&lines, 0).as_deref(), Some("TODO: x"));
/// assert_eq!(surrounding_context(&["only"], 0), None);
/// ```
#[must_use]
pub fn surrounding_context(all_lines: &[&str], index: usize) -> Option<String> {
    let before = index.checked_sub(1).and_then(|i| all_lines.get(i));
    let after = index.checked_add(1).and_then(|i| all_lines.get(i));

    let parts: Vec<&str> = [before, after]
        .into_iter()
        .flatten()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(CONTEXT_SEPARATOR))
}
