//! Deterministic two-way log merge
//!
//! Reconciles "my log" with "their log" into one superset view. My log is
//! authoritative for every id it already contains; unseen messages from
//! their log are re-stamped with the local receipt time and appended, then
//! the combined list is stable-sorted by `received_at`. The sort governs
//! display order, not causal order, since no party can observe the other's
//! clock reliably.
//!
//! Pure and synchronous: never touches the remote store, never suspends.
//! Exactly one "mine" and one "theirs" per conversation; multi-way merge is
//! out of scope.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{Message, MessageId};

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// The reconciled log, ordered for display
    pub merged: Vec<Message>,
    /// Messages from their log seen here for the first time, already
    /// re-stamped with the local receipt time
    pub newly_added: Vec<Message>,
}

/// Merge their log into mine.
///
/// `received_at` is the receipt stamp applied to every newly discovered
/// message; passing it in keeps the function pure and its output
/// deterministic for a given input.
///
/// Idempotence contract: when `newly_added` is empty, `merged` is `mine`
/// unchanged (no re-sort, no reallocation), which is what lets callers
/// skip a remote write when nothing new arrived.
pub fn merge(mine: Vec<Message>, theirs: &[Message], received_at: DateTime<Utc>) -> MergeResult {
    let mut seen: HashSet<MessageId> = mine.iter().map(|m| m.id).collect();

    let mut newly_added = Vec::new();
    for message in theirs {
        // First occurrence wins; also suppresses duplicate ids within theirs
        if seen.insert(message.id) {
            newly_added.push(message.received_copy(received_at));
        }
    }

    if newly_added.is_empty() {
        return MergeResult {
            merged: mine,
            newly_added,
        };
    }

    let mut merged = mine;
    merged.extend(newly_added.iter().cloned());
    // Stable: equal receipt times keep insertion order
    merged.sort_by(|a, b| a.received_at.cmp(&b.received_at));

    MergeResult {
        merged,
        newly_added,
    }
}
