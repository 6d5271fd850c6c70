//! Plain-text rendering for the command line.

use crate::aggregate::{self, ProfileStats, RemainingEstimate};
use crate::catalog::SearchPage;
use crate::models::{CustomWatchlist, CustomWatchlistItem, Theme, WatchStatus, WatchlistEntry};
use crate::view::{OwnedMedia, StatusBuckets};
use std::fmt::Write;

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// Human duration for an estimate, e.g. `2 days 3 hours 12 min`.
pub fn duration_text(estimate: &RemainingEstimate) -> String {
    if estimate.total_episodes_remaining == 0 {
        return "All caught up!".to_string();
    }

    let mut parts = Vec::new();
    if estimate.days > 0 {
        parts.push(plural(estimate.days, "day"));
    }
    if estimate.hours > 0 {
        parts.push(plural(estimate.hours, "hour"));
    }
    if estimate.minutes > 0 {
        parts.push(format!("{} min", estimate.minutes));
    }
    parts.join(" ")
}

pub fn render_estimate(estimate: &RemainingEstimate, episode_length_minutes: u32) -> String {
    let mut out = String::new();
    let length = match aggregate::preset_name(episode_length_minutes) {
        Some(name) => format!("{}, {} min", name, episode_length_minutes),
        None => format!("{} min", episode_length_minutes),
    };
    let _ = writeln!(
        out,
        "{} remaining ({} each)",
        plural(estimate.total_episodes_remaining, "episode"),
        length
    );
    let _ = writeln!(out, "Time to complete: {}", duration_text(estimate));
    let _ = write!(
        out,
        "Tip: Watching 2 episodes per day = {}",
        plural(estimate.days_at_two_per_day, "day")
    );
    out
}

pub fn rating_text(stats: &ProfileStats) -> String {
    if stats.has_ratings() {
        format!("{}/10", stats.average_rating)
    } else {
        "N/A".to_string()
    }
}

/// One decimal, except for an empty collection which reads `0%`.
pub fn percentage_text(stats: &ProfileStats, count: usize) -> String {
    if stats.total == 0 {
        return "0%".to_string();
    }
    format!("{:.1}%", stats.percentage(count))
}

pub fn render_stats(stats: &ProfileStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total anime:      {}", stats.total);
    let _ = writeln!(out, "Episodes watched: {}", stats.total_episodes_watched);
    let _ = writeln!(out, "Average rating:   {}", rating_text(stats));
    for status in WatchStatus::ALL.iter() {
        let count = stats.count_for(status);
        let _ = writeln!(
            out,
            "  {:<12} {:>4}  ({})",
            status.label(),
            count,
            percentage_text(stats, count)
        );
    }
    out.trim_end().to_string()
}

fn progress(entry: &WatchlistEntry) -> String {
    match entry.total_episodes {
        Some(total) => format!("{}/{}", entry.episodes_watched, total),
        None => format!("{}/?", entry.episodes_watched),
    }
}

pub fn entry_line(entry: &WatchlistEntry) -> String {
    let mut line = format!("[{}] {}  ep {}", entry.id, entry.title, progress(entry));
    if let Some(rating) = entry.rating {
        let _ = write!(line, "  ★{}", rating);
    }
    if let Some(notes) = &entry.notes {
        let _ = write!(line, "  \"{}\"", notes);
    }
    line
}

pub fn render_buckets(buckets: &StatusBuckets<'_>) -> String {
    let mut out = String::new();
    for status in WatchStatus::ALL.iter() {
        let entries = buckets.bucket(status);
        let _ = writeln!(out, "{} ({})", status.label(), entries.len());
        if entries.is_empty() {
            let _ = writeln!(out, "  nothing here yet");
        }
        for entry in entries {
            let _ = writeln!(out, "  {}", entry_line(entry));
        }
    }
    if buckets.unrecognized > 0 {
        let _ = writeln!(out, "({} with an unknown status not shown)", buckets.unrecognized);
    }
    out.trim_end().to_string()
}

pub fn media_line(item: &OwnedMedia) -> String {
    let media = &item.media;
    let mut line = format!("#{} {}", media.external_id, media.title);
    if let Some(year) = media.year {
        let _ = write!(line, " ({})", year);
    }
    match media.total_episodes {
        Some(n) => {
            let _ = write!(line, "  {}", plural(n.max(0) as u64, "ep"));
        }
        None => line.push_str("  ? eps"),
    }
    if let Some(score) = media.score {
        let _ = write!(line, "  {:.1}", score);
    }
    if item.in_list {
        line.push_str("  ✓ In List");
    }
    line
}

pub fn render_results(page: &SearchPage, results: &[OwnedMedia]) -> String {
    let mut out = String::new();
    for item in results {
        let _ = writeln!(out, "{}", media_line(item));
    }
    let _ = write!(out, "Page {} of {}", page.page, page.last_page);
    if page.has_next() {
        let _ = write!(out, " (--page {} for more)", page.page + 1);
    }
    out
}

pub fn list_line(list: &CustomWatchlist) -> String {
    let visibility = if list.is_public { "public" } else { "private" };
    match &list.description {
        Some(d) => format!("[{}] {} ({}) - {}", list.id, list.name, visibility, d),
        None => format!("[{}] {} ({})", list.id, list.name, visibility),
    }
}

pub fn render_list(list: &CustomWatchlist, items: &[CustomWatchlistItem]) -> String {
    let mut out = list_line(list);
    if items.is_empty() {
        out.push_str("\n  This list is empty");
    }
    for item in items {
        let _ = write!(out, "\n  [{}] #{} {}", item.id, item.external_media_id, item.title);
        if let Some(notes) = &item.notes {
            let _ = write!(out, "  \"{}\"", notes);
        }
    }
    out
}

pub fn render_themes(current: Theme) -> String {
    Theme::ALL
        .iter()
        .map(|theme| {
            let marker = if *theme == current { "*" } else { " " };
            format!("{} {:<8} {} - {}", marker, theme.as_str(), theme.display_name(), theme.description())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{compute_profile_stats, estimate_remaining, Scope};
    use crate::models::fixtures::{entry, media};
    use crate::view::group_by_status;

    fn estimate(episodes: i32, minutes: u32) -> RemainingEstimate {
        let entries = vec![entry("a", WatchStatus::Watching, Some(episodes), 0)];
        estimate_remaining(&entries, &Scope::All, minutes)
    }

    #[test]
    fn duration_text_pluralizes_each_unit() {
        // 75 * 24 = 1800 min = 1 day 6 hours
        assert_eq!(duration_text(&estimate(75, 24)), "1 day 6 hours");
        // 3 * 45 = 135 min
        assert_eq!(duration_text(&estimate(3, 45)), "2 hours 15 min");
        assert_eq!(duration_text(&estimate(1, 12)), "12 min");
        assert_eq!(duration_text(&estimate(0, 24)), "All caught up!");
    }

    #[test]
    fn estimate_includes_two_per_day_tip() {
        let text = render_estimate(&estimate(13, 24), 24);
        assert!(text.starts_with("13 episodes remaining (Standard, 24 min each)"));
        assert!(text.ends_with("Watching 2 episodes per day = 7 days"));
    }

    #[test]
    fn unrated_profile_shows_na() {
        let stats = compute_profile_stats(&[entry("a", WatchStatus::Watching, Some(12), 3)]);
        assert_eq!(rating_text(&stats), "N/A");
        let text = render_stats(&stats);
        assert!(text.contains("(100.0%)"));
        assert!(text.contains("(0.0%)"));

        let mut rated = entry("b", WatchStatus::Completed, Some(12), 12);
        rated.rating = Some(8);
        let stats = compute_profile_stats(&[rated]);
        assert_eq!(rating_text(&stats), "8/10");
    }

    #[test]
    fn buckets_render_in_fixed_order() {
        let entries = vec![
            entry("c", WatchStatus::Completed, Some(12), 12),
            entry("w", WatchStatus::Watching, None, 4),
            entry("x", WatchStatus::Unrecognized("dropped".into()), None, 0),
        ];
        let text = render_buckets(&group_by_status(&entries));
        let later = text.find("Watch Later").unwrap();
        let watching = text.find("Watching (1)").unwrap();
        let completed = text.find("Completed (1)").unwrap();
        assert!(later < watching && watching < completed);
        assert!(text.contains("ep 4/?"));
        assert!(text.contains("1 with an unknown status"));
    }

    #[test]
    fn owned_results_are_flagged() {
        let owned = OwnedMedia { media: media(7, "Mob Psycho 100"), in_list: true };
        assert!(media_line(&owned).ends_with("✓ In List"));

        let fresh = OwnedMedia { media: media(8, "Mononoke"), in_list: false };
        assert!(!media_line(&fresh).contains("In List"));
    }

    #[test]
    fn percentages_keep_one_decimal() {
        let entries = vec![
            entry("a", WatchStatus::Watching, Some(12), 1),
            entry("b", WatchStatus::Watching, Some(12), 1),
            entry("c", WatchStatus::Completed, Some(12), 12),
        ];
        let stats = compute_profile_stats(&entries);
        assert_eq!(percentage_text(&stats, stats.watching_count), "66.7%");
        assert_eq!(percentage_text(&stats, stats.watch_later_count), "0.0%");

        let empty = compute_profile_stats(&[]);
        assert_eq!(percentage_text(&empty, 0), "0%");
    }

    #[test]
    fn custom_lengths_have_no_preset_label() {
        let text = render_estimate(&estimate(2, 30), 30);
        assert!(text.starts_with("2 episodes remaining (30 min each)"));
    }
}
