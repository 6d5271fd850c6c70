//! Viewing-time estimates and profile statistics over a fetched watchlist.
//!
//! Everything here is a pure function of its input. Missing or negative
//! counts are treated as zero instead of being reported as errors.

use crate::models::{WatchStatus, WatchlistEntry};

/// Episode length presets offered to the user, in minutes.
pub const EPISODE_LENGTH_PRESETS: [(u32, &str); 3] =
    [(24, "Standard"), (12, "Short"), (45, "Long")];

pub const DEFAULT_EPISODE_LENGTH: u32 = 24;

/// Label of the preset matching `minutes`, if any.
pub fn preset_name(minutes: u32) -> Option<&'static str> {
    EPISODE_LENGTH_PRESETS
        .iter()
        .find(|(length, _)| *length == minutes)
        .map(|(_, name)| *name)
}

/// Which entries a remaining-time estimate covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    WatchingOnly,
    Entry(String),
}

impl Scope {
    /// `all`, `watching`, or anything else as an entry id.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "all" => Self::All,
            "watching" | "watching-only" => Self::WatchingOnly,
            id => Self::Entry(id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemainingEstimate {
    pub total_episodes_remaining: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub days_at_two_per_day: u64,
}

impl RemainingEstimate {
    pub fn total_minutes(&self) -> u64 {
        (self.days * 24 + self.hours) * 60 + self.minutes
    }
}

/// Episodes left for one entry, never negative.
pub fn remaining_episodes(entry: &WatchlistEntry) -> u64 {
    let total = i64::from(entry.total_episodes.unwrap_or(0));
    let watched = i64::from(entry.episodes_watched);
    (total - watched).max(0) as u64
}

pub fn estimate_remaining(
    entries: &[WatchlistEntry],
    scope: &Scope,
    episode_length_minutes: u32,
) -> RemainingEstimate {
    let total_episodes_remaining: u64 = match scope {
        Scope::All => entries.iter().map(remaining_episodes).sum(),
        Scope::WatchingOnly => entries
            .iter()
            .filter(|e| e.status == WatchStatus::Watching)
            .map(remaining_episodes)
            .sum(),
        Scope::Entry(id) => entries
            .iter()
            .find(|e| &e.id == id)
            .map(remaining_episodes)
            .unwrap_or(0),
    };

    let total_minutes = total_episodes_remaining * u64::from(episode_length_minutes);
    let hours = total_minutes / 60;

    RemainingEstimate {
        total_episodes_remaining,
        days: hours / 24,
        hours: hours % 24,
        minutes: total_minutes % 60,
        days_at_two_per_day: total_episodes_remaining.div_ceil(2),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileStats {
    pub total: usize,
    pub watch_later_count: usize,
    pub watching_count: usize,
    pub completed_count: usize,
    /// Mean of ratings above zero, one decimal. Zero when nothing is rated.
    pub average_rating: f64,
    pub total_episodes_watched: u64,
}

impl ProfileStats {
    /// Share of `count` in the whole collection, in percent with one decimal.
    pub fn percentage(&self, count: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round_one_decimal(count as f64 / self.total as f64 * 100.0)
    }

    pub fn count_for(&self, status: &WatchStatus) -> usize {
        match status {
            WatchStatus::WatchLater => self.watch_later_count,
            WatchStatus::Watching => self.watching_count,
            WatchStatus::Completed => self.completed_count,
            WatchStatus::Unrecognized(_) => 0,
        }
    }

    pub fn has_ratings(&self) -> bool {
        self.average_rating > 0.0
    }
}

pub fn compute_profile_stats(entries: &[WatchlistEntry]) -> ProfileStats {
    let count = |status: WatchStatus| entries.iter().filter(|e| e.status == status).count();

    let ratings: Vec<i32> = entries
        .iter()
        .filter_map(|e| e.rating)
        .filter(|r| *r > 0)
        .collect();
    let average_rating = if ratings.is_empty() {
        0.0
    } else {
        let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
        round_one_decimal(sum as f64 / ratings.len() as f64)
    };

    ProfileStats {
        total: entries.len(),
        watch_later_count: count(WatchStatus::WatchLater),
        watching_count: count(WatchStatus::Watching),
        completed_count: count(WatchStatus::Completed),
        average_rating,
        total_episodes_watched: entries
            .iter()
            .map(|e| e.episodes_watched.max(0) as u64)
            .sum(),
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
