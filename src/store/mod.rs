//! Remote store façade: the relational backend seen as owner-scoped records.

mod memory;
mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

use crate::auth::Session;
use crate::error::Result;
use crate::models::{
    CustomWatchlist, CustomWatchlistItem, EntryUpdate, ListDraft, NewListItem, NewWatchlistEntry,
    SharedList, Theme, UserProfile, WatchlistEntry,
};
use async_trait::async_trait;
use std::str::FromStr;

/// Sort order for the main watchlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryOrder {
    #[default]
    RecentlyAdded,
    RecentlyUpdated,
}

impl FromStr for EntryOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "added" => Ok(Self::RecentlyAdded),
            "updated" => Ok(Self::RecentlyUpdated),
            other => Err(format!("unknown sort '{}', expected added or updated", other)),
        }
    }
}

/// Every call that takes a `Session` is scoped to `session.user.id`. Rows
/// owned by someone else behave as if they did not exist.
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn list_entries(&self, session: &Session, order: EntryOrder) -> Result<Vec<WatchlistEntry>>;

    /// Fails with `Duplicate` if the owner already lists this media.
    async fn insert_entry(&self, session: &Session, entry: &NewWatchlistEntry) -> Result<WatchlistEntry>;

    async fn update_entry(&self, session: &Session, id: &str, update: &EntryUpdate) -> Result<WatchlistEntry>;

    async fn delete_entry(&self, session: &Session, id: &str) -> Result<()>;

    async fn list_custom_lists(&self, session: &Session) -> Result<Vec<CustomWatchlist>>;

    async fn get_custom_list(&self, session: &Session, id: &str) -> Result<CustomWatchlist>;

    async fn create_custom_list(&self, session: &Session, draft: &ListDraft) -> Result<CustomWatchlist>;

    async fn update_custom_list(&self, session: &Session, id: &str, draft: &ListDraft) -> Result<CustomWatchlist>;

    /// Items of the list go with it.
    async fn delete_custom_list(&self, session: &Session, id: &str) -> Result<()>;

    async fn list_items(&self, session: &Session, list_id: &str) -> Result<Vec<CustomWatchlistItem>>;

    async fn add_list_item(&self, session: &Session, list_id: &str, item: &NewListItem) -> Result<CustomWatchlistItem>;

    async fn remove_list_item(&self, session: &Session, item_id: &str) -> Result<()>;

    /// Read a public list by share token. No identity is involved.
    async fn shared_list(&self, share_token: &str) -> Result<SharedList>;

    async fn get_profile(&self, session: &Session) -> Result<Option<UserProfile>>;

    /// Creates the profile row on first use.
    async fn upsert_theme(&self, session: &Session, theme: Theme) -> Result<UserProfile>;
}
