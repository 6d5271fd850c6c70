use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status bucket of a watchlist entry.
///
/// Stored as a plain string; values outside the three known buckets are kept
/// as `Unrecognized` rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WatchStatus {
    WatchLater,
    Watching,
    Completed,
    Unrecognized(String),
}

impl WatchStatus {
    pub const ALL: [WatchStatus; 3] = [Self::WatchLater, Self::Watching, Self::Completed];

    pub fn as_db_str(&self) -> &str {
        match self {
            Self::WatchLater => "watch_later",
            Self::Watching => "watching",
            Self::Completed => "completed",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "watch_later" => Self::WatchLater,
            "watching" => Self::Watching,
            "completed" => Self::Completed,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::WatchLater => "Watch Later",
            Self::Watching => "Watching",
            Self::Completed => "Completed",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for WatchStatus {
    fn from(s: String) -> Self {
        Self::from_db_str(&s)
    }
}

impl From<WatchStatus> for String {
    fn from(status: WatchStatus) -> Self {
        status.as_db_str().to_string()
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WatchStatus {
    type Err = String;

    /// Parses user input; only the three known buckets are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "watch_later" | "later" => Ok(Self::WatchLater),
            "watching" => Ok(Self::Watching),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(format!(
                "unknown status '{}', expected watch_later, watching or completed",
                other
            )),
        }
    }
}

/// A row of the user's main watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: String,
    pub owner_id: String,
    pub external_media_id: i64,
    pub title: String,
    pub title_native: Option<String>,
    pub image_url: Option<String>,
    pub total_episodes: Option<i32>,
    pub episodes_watched: i32,
    pub status: WatchStatus,
    pub rating: Option<i32>,
    pub notes: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields needed to add a catalog record to the watchlist.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWatchlistEntry {
    pub external_media_id: i64,
    pub title: String,
    pub title_native: Option<String>,
    pub image_url: Option<String>,
    pub total_episodes: Option<i32>,
    pub status: WatchStatus,
}

impl NewWatchlistEntry {
    pub fn from_media(media: &MediaRecord, status: WatchStatus) -> Self {
        Self {
            external_media_id: media.external_id,
            title: media.title.clone(),
            title_native: media.title_native.clone(),
            image_url: media.image_url.clone(),
            total_episodes: media.total_episodes,
            status,
        }
    }
}

/// The editable part of a watchlist entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryUpdate {
    pub status: Option<WatchStatus>,
    pub episodes_watched: Option<i32>,
    /// `Some(0)` clears the rating.
    pub rating: Option<i32>,
    /// `Some("")` clears the notes.
    pub notes: Option<String>,
}

/// Upper bound for progress when the total episode count is unknown.
pub const UNKNOWN_TOTAL_EPISODE_CAP: i32 = 999;

/// An [`EntryUpdate`] with every field resolved against the current entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpdate {
    pub status: WatchStatus,
    pub episodes_watched: i32,
    pub rating: Option<i32>,
    pub notes: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.episodes_watched.is_none()
            && self.rating.is_none()
            && self.notes.is_none()
    }

    /// Merge onto `current`, clamping progress and rating into range.
    pub fn resolve(&self, current: &WatchlistEntry) -> ResolvedUpdate {
        let cap = current
            .total_episodes
            .filter(|t| *t > 0)
            .unwrap_or(UNKNOWN_TOTAL_EPISODE_CAP);
        let episodes_watched = self
            .episodes_watched
            .unwrap_or(current.episodes_watched)
            .clamp(0, cap);

        let rating = match self.rating {
            Some(r) if r <= 0 => None,
            Some(r) => Some(r.min(10)),
            None => current.rating,
        };

        let notes = match &self.notes {
            Some(n) if n.trim().is_empty() => None,
            Some(n) => Some(n.trim().to_string()),
            None => current.notes.clone(),
        };

        ResolvedUpdate {
            status: self.status.clone().unwrap_or_else(|| current.status.clone()),
            episodes_watched,
            rating,
            notes,
        }
    }
}

/// A user-curated, optionally shareable list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomWatchlist {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub share_token: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create/edit form for a custom list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListDraft {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomWatchlistItem {
    pub id: String,
    pub watchlist_id: String,
    pub external_media_id: i64,
    pub title: String,
    pub title_native: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewListItem {
    pub external_media_id: i64,
    pub title: String,
    pub title_native: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
}

impl NewListItem {
    pub fn from_media(media: &MediaRecord, notes: Option<String>) -> Self {
        Self {
            external_media_id: media.external_id,
            title: media.title.clone(),
            title_native: media.title_native.clone(),
            image_url: media.image_url.clone(),
            notes: notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

/// A public list resolved through its share token.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedList {
    pub list: CustomWatchlist,
    pub items: Vec<CustomWatchlistItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Starry,
    Sakura,
    Neon,
    Minimal,
}

impl Theme {
    pub const ALL: [Theme; 4] = [Self::Starry, Self::Sakura, Self::Neon, Self::Minimal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starry => "starry",
            Self::Sakura => "sakura",
            Self::Neon => "neon",
            Self::Minimal => "minimal",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Starry => "Starry Handdrawn",
            Self::Sakura => "Sakura Dreams",
            Self::Neon => "Neon City",
            Self::Minimal => "Minimal Zen",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Starry => "Cozy anime vibes with hand-drawn elements",
            Self::Sakura => "Soft pink cherry blossom aesthetic",
            Self::Neon => "Vibrant cyberpunk inspired colors",
            Self::Minimal => "Clean and simple design",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown theme '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub theme: Theme,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A record from the external anime catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub external_id: i64,
    pub title: String,
    pub title_native: Option<String>,
    pub image_url: Option<String>,
    pub total_episodes: Option<i32>,
    pub score: Option<f32>,
    pub year: Option<i32>,
}
