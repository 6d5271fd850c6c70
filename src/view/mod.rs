use crate::models::{MediaRecord, WatchStatus, WatchlistEntry};
use std::collections::HashSet;

/// A fetched watchlist split into the three display buckets.
#[derive(Debug, Default)]
pub struct StatusBuckets<'a> {
    pub watch_later: Vec<&'a WatchlistEntry>,
    pub watching: Vec<&'a WatchlistEntry>,
    pub completed: Vec<&'a WatchlistEntry>,
    /// Entries left out of every bucket because their status is unknown.
    pub unrecognized: usize,
}

impl<'a> StatusBuckets<'a> {
    pub fn bucket(&self, status: &WatchStatus) -> &[&'a WatchlistEntry] {
        match status {
            WatchStatus::WatchLater => &self.watch_later,
            WatchStatus::Watching => &self.watching,
            WatchStatus::Completed => &self.completed,
            WatchStatus::Unrecognized(_) => &[],
        }
    }

    pub fn grouped_len(&self) -> usize {
        self.watch_later.len() + self.watching.len() + self.completed.len()
    }
}

/// Partition `entries` by status, keeping their order within each bucket.
pub fn group_by_status(entries: &[WatchlistEntry]) -> StatusBuckets<'_> {
    let mut buckets = StatusBuckets::default();
    for entry in entries {
        match entry.status {
            WatchStatus::WatchLater => buckets.watch_later.push(entry),
            WatchStatus::Watching => buckets.watching.push(entry),
            WatchStatus::Completed => buckets.completed.push(entry),
            WatchStatus::Unrecognized(_) => buckets.unrecognized += 1,
        }
    }
    buckets
}

/// A catalog record flagged with whether the caller already lists it.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedMedia {
    pub media: MediaRecord,
    pub in_list: bool,
}

pub fn owned_ids(entries: &[WatchlistEntry]) -> HashSet<i64> {
    entries.iter().map(|e| e.external_media_id).collect()
}

pub fn mark_owned(results: &[MediaRecord], owned: &HashSet<i64>) -> Vec<OwnedMedia> {
    results
        .iter()
        .map(|media| OwnedMedia {
            media: media.clone(),
            in_list: owned.contains(&media.external_id),
        })
        .collect()
}

/// Entries that can be picked for a watch session.
pub fn schedulable(entries: &[WatchlistEntry]) -> Vec<&WatchlistEntry> {
    entries
        .iter()
        .filter(|e| matches!(e.status, WatchStatus::WatchLater | WatchStatus::Watching))
        .collect()
}
