use super::{EntryOrder, WatchlistStore};
use crate::auth::Session;
use crate::error::{AppError, Result};
use crate::http::HttpClient;
use crate::models::{
    CustomWatchlist, CustomWatchlistItem, EntryUpdate, ListDraft, NewListItem, NewWatchlistEntry,
    SharedList, Theme, UserProfile, WatchStatus, WatchlistEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

const WATCHLIST: &str = "watchlist";
const CUSTOM_LISTS: &str = "custom_watchlists";
const LIST_ITEMS: &str = "custom_watchlist_items";
const PROFILES: &str = "profiles";

/// PostgREST-backed store. Row-level security on the server is the real
/// access check; the owner filters here keep queries narrow.
pub struct SupabaseStore {
    http: HttpClient,
    rest_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct WatchlistRow {
    id: String,
    user_id: String,
    anime_id: i64,
    anime_title: String,
    anime_title_japanese: Option<String>,
    anime_image: Option<String>,
    total_episodes: Option<i32>,
    episodes_watched: Option<i32>,
    status: String,
    rating: Option<i32>,
    notes: Option<String>,
    added_date: Option<DateTime<Utc>>,
    updated_date: Option<DateTime<Utc>>,
}

impl From<WatchlistRow> for WatchlistEntry {
    fn from(row: WatchlistRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.user_id,
            external_media_id: row.anime_id,
            title: row.anime_title,
            title_native: row.anime_title_japanese,
            image_url: row.anime_image,
            total_episodes: row.total_episodes,
            episodes_watched: row.episodes_watched.unwrap_or(0),
            status: WatchStatus::from_db_str(&row.status),
            rating: row.rating,
            notes: row.notes,
            added_at: row.added_date,
            updated_at: row.updated_date,
        }
    }
}

#[derive(Debug, Serialize)]
struct WatchlistInsert<'a> {
    user_id: &'a str,
    anime_id: i64,
    anime_title: &'a str,
    anime_title_japanese: Option<&'a str>,
    anime_image: Option<&'a str>,
    total_episodes: Option<i32>,
    status: &'a str,
}

#[derive(Debug, Serialize)]
struct WatchlistPatch<'a> {
    status: &'a str,
    episodes_watched: i32,
    rating: Option<i32>,
    notes: Option<&'a str>,
    updated_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CustomListRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    is_public: Option<bool>,
    share_token: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<CustomListRow> for CustomWatchlist {
    fn from(row: CustomListRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.user_id,
            name: row.name,
            description: row.description,
            is_public: row.is_public.unwrap_or(false),
            share_token: row.share_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CustomListWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    name: &'a str,
    description: Option<&'a str>,
    is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListItemRow {
    id: String,
    watchlist_id: String,
    anime_id: i64,
    anime_title: String,
    anime_title_japanese: Option<String>,
    anime_image: Option<String>,
    notes: Option<String>,
    added_at: Option<DateTime<Utc>>,
}

impl From<ListItemRow> for CustomWatchlistItem {
    fn from(row: ListItemRow) -> Self {
        Self {
            id: row.id,
            watchlist_id: row.watchlist_id,
            external_media_id: row.anime_id,
            title: row.anime_title,
            title_native: row.anime_title_japanese,
            image_url: row.anime_image,
            notes: row.notes,
            added_at: row.added_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListItemInsert<'a> {
    watchlist_id: &'a str,
    anime_id: i64,
    anime_title: &'a str,
    anime_title_japanese: Option<&'a str>,
    anime_image: Option<&'a str>,
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    email: Option<String>,
    theme: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            theme: row
                .theme
                .and_then(|t| t.parse().ok())
                .unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfileUpsert<'a> {
    id: &'a str,
    email: Option<&'a str>,
    theme: &'a str,
    updated_at: DateTime<Utc>,
}

fn eq(value: &str) -> String {
    format!("eq.{}", urlencoding::encode(value))
}

fn first<T>(rows: Vec<T>) -> Result<T> {
    rows.into_iter().next().ok_or(AppError::NotFound)
}

impl SupabaseStore {
    pub fn new(http: HttpClient, backend_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", backend_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn table(&self, method: Method, table: &str, query: &str, bearer: Option<&str>) -> RequestBuilder {
        self.table_with_prefer(method, table, query, bearer, "return=representation")
    }

    /// `bearer` falls back to the anon key for capability reads.
    fn table_with_prefer(
        &self,
        method: Method,
        table: &str,
        query: &str,
        bearer: Option<&str>,
        prefer: &str,
    ) -> RequestBuilder {
        let url = if query.is_empty() {
            format!("{}/{}", self.rest_url, table)
        } else {
            format!("{}/{}?{}", self.rest_url, table, query)
        };
        self.http
            .request(method, &url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(self.anon_key.as_str()))
            .header("Prefer", prefer)
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>> {
        self.http.send_json::<Vec<T>>(request).await
    }

    async fn fetch_entry(&self, session: &Session, id: &str) -> Result<WatchlistEntry> {
        let query = format!("select=*&id={}&user_id={}", eq(id), eq(session.owner_id()));
        let request = self.table(Method::GET, WATCHLIST, &query, Some(&session.access_token));
        first(self.rows::<WatchlistRow>(request).await?).map(Into::into)
    }
}

#[async_trait]
impl WatchlistStore for SupabaseStore {
    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn list_entries(&self, session: &Session, order: EntryOrder) -> Result<Vec<WatchlistEntry>> {
        let order_by = match order {
            EntryOrder::RecentlyAdded => "added_date.desc",
            EntryOrder::RecentlyUpdated => "updated_date.desc",
        };
        let query = format!("select=*&user_id={}&order={}", eq(session.owner_id()), order_by);
        let request = self.table(Method::GET, WATCHLIST, &query, Some(&session.access_token));

        let rows: Vec<WatchlistRow> = self.rows(request).await?;
        debug!("Fetched {} watchlist rows", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, session, entry), fields(user = %session.user.id, media = entry.external_media_id))]
    async fn insert_entry(&self, session: &Session, entry: &NewWatchlistEntry) -> Result<WatchlistEntry> {
        let body = WatchlistInsert {
            user_id: session.owner_id(),
            anime_id: entry.external_media_id,
            anime_title: &entry.title,
            anime_title_japanese: entry.title_native.as_deref(),
            anime_image: entry.image_url.as_deref(),
            total_episodes: entry.total_episodes,
            status: entry.status.as_db_str(),
        };
        let request = self
            .table(Method::POST, WATCHLIST, "", Some(&session.access_token))
            .json(&body);

        let created: WatchlistEntry = first(self.rows::<WatchlistRow>(request).await?)?.into();
        info!("Added '{}' to {}", created.title, created.status);
        Ok(created)
    }

    #[instrument(skip(self, session, update), fields(user = %session.user.id))]
    async fn update_entry(&self, session: &Session, id: &str, update: &EntryUpdate) -> Result<WatchlistEntry> {
        let current = self.fetch_entry(session, id).await?;
        let resolved = update.resolve(&current);

        let body = WatchlistPatch {
            status: resolved.status.as_db_str(),
            episodes_watched: resolved.episodes_watched,
            rating: resolved.rating,
            notes: resolved.notes.as_deref(),
            updated_date: Utc::now(),
        };
        let query = format!("id={}&user_id={}", eq(id), eq(session.owner_id()));
        let request = self
            .table(Method::PATCH, WATCHLIST, &query, Some(&session.access_token))
            .json(&body);

        first(self.rows::<WatchlistRow>(request).await?).map(Into::into)
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn delete_entry(&self, session: &Session, id: &str) -> Result<()> {
        let query = format!("id={}&user_id={}", eq(id), eq(session.owner_id()));
        let request = self.table(Method::DELETE, WATCHLIST, &query, Some(&session.access_token));
        first(self.rows::<WatchlistRow>(request).await?).map(|_| ())
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn list_custom_lists(&self, session: &Session) -> Result<Vec<CustomWatchlist>> {
        let query = format!("select=*&user_id={}&order=created_at.desc", eq(session.owner_id()));
        let request = self.table(Method::GET, CUSTOM_LISTS, &query, Some(&session.access_token));
        let rows: Vec<CustomListRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn get_custom_list(&self, session: &Session, id: &str) -> Result<CustomWatchlist> {
        let query = format!("select=*&id={}&user_id={}", eq(id), eq(session.owner_id()));
        let request = self.table(Method::GET, CUSTOM_LISTS, &query, Some(&session.access_token));
        first(self.rows::<CustomListRow>(request).await?).map(Into::into)
    }

    #[instrument(skip(self, session, draft), fields(user = %session.user.id))]
    async fn create_custom_list(&self, session: &Session, draft: &ListDraft) -> Result<CustomWatchlist> {
        let body = CustomListWrite {
            user_id: Some(session.owner_id()),
            name: &draft.name,
            description: draft.description.as_deref(),
            is_public: draft.is_public,
            updated_at: None,
        };
        let request = self
            .table(Method::POST, CUSTOM_LISTS, "", Some(&session.access_token))
            .json(&body);
        let list: CustomWatchlist = first(self.rows::<CustomListRow>(request).await?)?.into();
        info!("Created custom list '{}'", list.name);
        Ok(list)
    }

    #[instrument(skip(self, session, draft), fields(user = %session.user.id))]
    async fn update_custom_list(&self, session: &Session, id: &str, draft: &ListDraft) -> Result<CustomWatchlist> {
        let body = CustomListWrite {
            user_id: None,
            name: &draft.name,
            description: draft.description.as_deref(),
            is_public: draft.is_public,
            updated_at: Some(Utc::now()),
        };
        let query = format!("id={}&user_id={}", eq(id), eq(session.owner_id()));
        let request = self
            .table(Method::PATCH, CUSTOM_LISTS, &query, Some(&session.access_token))
            .json(&body);
        first(self.rows::<CustomListRow>(request).await?).map(Into::into)
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn delete_custom_list(&self, session: &Session, id: &str) -> Result<()> {
        // Items are removed by the foreign key's ON DELETE CASCADE.
        let query = format!("id={}&user_id={}", eq(id), eq(session.owner_id()));
        let request = self.table(Method::DELETE, CUSTOM_LISTS, &query, Some(&session.access_token));
        first(self.rows::<CustomListRow>(request).await?).map(|_| ())
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn list_items(&self, session: &Session, list_id: &str) -> Result<Vec<CustomWatchlistItem>> {
        self.get_custom_list(session, list_id).await?;

        let query = format!("select=*&watchlist_id={}&order=added_at.desc", eq(list_id));
        let request = self.table(Method::GET, LIST_ITEMS, &query, Some(&session.access_token));
        let rows: Vec<ListItemRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, session, item), fields(user = %session.user.id))]
    async fn add_list_item(&self, session: &Session, list_id: &str, item: &NewListItem) -> Result<CustomWatchlistItem> {
        self.get_custom_list(session, list_id).await?;

        let body = ListItemInsert {
            watchlist_id: list_id,
            anime_id: item.external_media_id,
            anime_title: &item.title,
            anime_title_japanese: item.title_native.as_deref(),
            anime_image: item.image_url.as_deref(),
            notes: item.notes.as_deref(),
        };
        let request = self
            .table(Method::POST, LIST_ITEMS, "", Some(&session.access_token))
            .json(&body);
        first(self.rows::<ListItemRow>(request).await?).map(Into::into)
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn remove_list_item(&self, session: &Session, item_id: &str) -> Result<()> {
        // Items carry no owner column; row-level security scopes the delete.
        let query = format!("id={}", eq(item_id));
        let request = self.table(Method::DELETE, LIST_ITEMS, &query, Some(&session.access_token));
        first(self.rows::<ListItemRow>(request).await?).map(|_| ())
    }

    #[instrument(skip(self, share_token))]
    async fn shared_list(&self, share_token: &str) -> Result<SharedList> {
        let query = format!("select=*&share_token={}&is_public=eq.true", eq(share_token));
        let request = self.table(Method::GET, CUSTOM_LISTS, &query, None);
        let list: CustomWatchlist = first(self.rows::<CustomListRow>(request).await?)?.into();

        let query = format!("select=*&watchlist_id={}&order=added_at.desc", eq(&list.id));
        let request = self.table(Method::GET, LIST_ITEMS, &query, None);
        let rows: Vec<ListItemRow> = self.rows(request).await?;

        Ok(SharedList {
            list,
            items: rows.into_iter().map(Into::into).collect(),
        })
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn get_profile(&self, session: &Session) -> Result<Option<UserProfile>> {
        let query = format!("select=*&id={}", eq(session.owner_id()));
        let request = self.table(Method::GET, PROFILES, &query, Some(&session.access_token));
        let rows: Vec<ProfileRow> = self.rows(request).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    async fn upsert_theme(&self, session: &Session, theme: Theme) -> Result<UserProfile> {
        let body = ProfileUpsert {
            id: session.owner_id(),
            email: session.user.email.as_deref(),
            theme: theme.as_str(),
            updated_at: Utc::now(),
        };
        let request = self
            .table_with_prefer(
                Method::POST,
                PROFILES,
                "on_conflict=id",
                Some(&session.access_token),
                "resolution=merge-duplicates,return=representation",
            )
            .json(&body);
        first(self.rows::<ProfileRow>(request).await?).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchlist_rows_map_onto_entries() {
        let json = r#"[{
            "id": "7d5c", "user_id": "u1", "anime_id": 52991,
            "anime_title": "Sousou no Frieren", "anime_title_japanese": "葬送のフリーレン",
            "anime_image": null, "total_episodes": 28, "episodes_watched": null,
            "status": "watching", "rating": 10, "notes": null,
            "added_date": "2024-03-01T10:00:00.123456+00:00", "updated_date": null
        }]"#;
        let rows: Vec<WatchlistRow> = serde_json::from_str(json).unwrap();
        let entry: WatchlistEntry = rows.into_iter().next().unwrap().into();

        assert_eq!(entry.external_media_id, 52991);
        assert_eq!(entry.owner_id, "u1");
        assert_eq!(entry.episodes_watched, 0);
        assert_eq!(entry.status, WatchStatus::Watching);
        assert_eq!(entry.title_native.as_deref(), Some("葬送のフリーレン"));
        assert!(entry.added_at.is_some());
    }

    #[test]
    fn unknown_profile_theme_falls_back_to_default() {
        let row: ProfileRow =
            serde_json::from_str(r#"{"id":"u1","email":null,"theme":"vaporwave"}"#).unwrap();
        let profile: UserProfile = row.into();
        assert_eq!(profile.theme, Theme::Starry);
    }

    #[test]
    fn patch_body_clears_rating_with_null() {
        let body = WatchlistPatch {
            status: "completed",
            episodes_watched: 12,
            rating: None,
            notes: None,
            updated_date: Utc::now(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value["rating"].is_null());
        assert!(value.as_object().unwrap().contains_key("notes"));
    }

    #[test]
    fn filter_values_are_encoded() {
        assert_eq!(eq("a b&c"), "eq.a%20b%26c");
    }

    #[test]
    fn list_update_omits_owner() {
        let body = CustomListWrite {
            user_id: None,
            name: "Top 10",
            description: None,
            is_public: true,
            updated_at: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("user_id").is_none());
        assert_eq!(value["is_public"], true);
    }
}
