//! Reconciliation of inferred todo candidates against a file's existing todos.
//!
//! A candidate is a duplicate of an existing record when either
//!
//! - its normalized text equals the record's normalized text (regardless of
//!   line distance), or
//! - it sits within [`LINE_PROXIMITY`] lines of the record and the token-set
//!   similarity of the two texts is strictly above [`SIMILARITY_THRESHOLD`].
//!
//! Normalization lowercases, collapses whitespace runs to one space and trims.
//! Token-set similarity is the Jaccard index over the sets of space-separated
//! words of the normalized texts.
//!
//! By default candidates are judged against the pre-existing records only:
//! two near-identical candidates in the same batch are both accepted. This is
//! the [`ReconcilePolicy::AgainstExisting`] policy. [`ReconcilePolicy::WithinBatch`]
//! additionally checks each candidate against the candidates already accepted
//! in the same call.
//!
//! # Example
//!
//! ```
//! use notetodo_monitor::reconcile::similarity;
//!
//! assert_eq!(similarity("Fix the bug", "fix   THE bug"), 1.0);
//! assert_eq!(similarity("Fix the bug", "Fix the login bug"), 0.75);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::types::TodoRecord;

/// Maximum line distance for the proximity rule.
pub const LINE_PROXIMITY: u32 = 2;

/// Similarity must be strictly greater than this for the proximity rule.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Which records a candidate is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilePolicy {
    /// Only records that existed before the call.
    #[default]
    AgainstExisting,
    /// Existing records plus candidates accepted earlier in the same call.
    WithinBatch,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Candidates to append to the store, in input order.
    pub accepted: Vec<TodoRecord>,
    pub accepted_count: usize,
    pub skipped_count: usize,
}

/// Lowercases, collapses whitespace runs to single spaces and trims.
///
/// # Example
///
/// ```
/// use notetodo_monitor::reconcile::normalize;
///
/// assert_eq!(normalize("  Buy\t  MILK \n"), "buy milk");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Jaccard index over the word sets of the normalized texts.
///
/// Identical normalized texts score `1.0` without building sets, so two empty
/// strings are fully similar. One empty and one non-empty text score `0.0`.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_normalized(&normalize(a), &normalize(b))
}

fn similarity_normalized(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let left: HashSet<&str> = a.split(' ').filter(|t| !t.is_empty()).collect();
    let right: HashSet<&str> = b.split(' ').filter(|t| !t.is_empty()).collect();

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();

    intersection as f64 / union as f64
}

/// Why a candidate was considered a duplicate.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DuplicateReason {
    ExactText,
    NearbySimilar(f64),
}

fn duplicate_reason(
    candidate: &TodoRecord,
    candidate_text: &str,
    target: &TodoRecord,
    target_text: &str,
) -> Option<DuplicateReason> {
    if candidate_text == target_text {
        return Some(DuplicateReason::ExactText);
    }

    if candidate.line_number.abs_diff(target.line_number) <= LINE_PROXIMITY {
        let score = similarity_normalized(candidate_text, target_text);
        if score > SIMILARITY_THRESHOLD {
            return Some(DuplicateReason::NearbySimilar(score));
        }
    }

    None
}

/// Merges `candidates` into a file's todos, dropping duplicates.
///
/// Existing records are never modified; the caller appends
/// [`ReconcileOutcome::accepted`] to the store.
///
/// # Arguments
///
/// * `file_path` - The file being reconciled (for diagnostics)
/// * `existing` - Records currently stored for `file_path`
/// * `candidates` - Inferred records, in the order the provider returned them
/// * `policy` - Which records each candidate is compared against
#[must_use]
pub fn reconcile(
    file_path: &str,
    existing: &[TodoRecord],
    candidates: Vec<TodoRecord>,
    policy: ReconcilePolicy,
) -> ReconcileOutcome {
    let existing_texts: Vec<String> = existing.iter().map(|r| normalize(&r.text)).collect();
    let mut accepted: Vec<TodoRecord> = Vec::new();
    let mut accepted_texts: Vec<String> = Vec::new();
    let mut skipped_count = 0;

    for candidate in candidates {
        let candidate_text = normalize(&candidate.text);

        let mut reason = existing
            .iter()
            .zip(&existing_texts)
            .find_map(|(target, text)| duplicate_reason(&candidate, &candidate_text, target, text));

        if reason.is_none() && policy == ReconcilePolicy::WithinBatch {
            reason = accepted
                .iter()
                .zip(&accepted_texts)
                .find_map(|(target, text)| duplicate_reason(&candidate, &candidate_text, target, text));
        }

        match reason {
            Some(reason) => {
                let (rule, score) = match reason {
                    DuplicateReason::ExactText => ("exact", 1.0),
                    DuplicateReason::NearbySimilar(score) => ("nearby-similar", score),
                };
                trace!(
                    file_path = %file_path,
                    line_number = candidate.line_number,
                    rule,
                    similarity = score,
                    "Skipping duplicate candidate"
                );
                skipped_count += 1;
            }
            None => {
                accepted_texts.push(candidate_text);
                accepted.push(candidate);
            }
        }
    }

    debug!(
        file_path = %file_path,
        existing = existing.len(),
        accepted = accepted.len(),
        skipped = skipped_count,
        policy = ?policy,
        "Reconciled inferred candidates"
    );

    ReconcileOutcome {
        accepted_count: accepted.len(),
        accepted,
        skipped_count,
    }
}
