//! Pure pairing logic over the search queue.
//!
//! The queue is kept ordered by enqueue time, front = longest waiting.

use std::collections::VecDeque;

use super::{entity::SearchEntry, filter::is_mutually_compatible};

/// Index of the earliest-enqueued entry that is mutually compatible with
/// `entrant` and belongs to a different client.
pub fn find_earliest_compatible(
    queue: &VecDeque<SearchEntry>,
    entrant: &SearchEntry,
) -> Option<usize> {
    queue.iter().position(|candidate| {
        candidate.client_id != entrant.client_id
            && is_mutually_compatible(&candidate.criteria, &entrant.criteria)
    })
}

/// Position at which `entry` keeps the queue ordered by enqueue time.
///
/// Entries with an equal timestamp stay ahead of the new one.
pub fn insertion_index(queue: &VecDeque<SearchEntry>, entry: &SearchEntry) -> usize {
    queue.partition_point(|queued| queued.enqueued_at <= entry.enqueued_at)
}
