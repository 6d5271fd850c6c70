//! User actions over the store: what the pages of the app do when a button
//! is pressed. Every mutating call checks for a session before it reaches
//! the network and publishes an invalidation after it succeeds.

use crate::aggregate::{self, ProfileStats, RemainingEstimate, Scope};
use crate::auth::SessionProvider;
use crate::error::{AppError, Result};
use crate::models::{
    CustomWatchlist, CustomWatchlistItem, EntryUpdate, ListDraft, MediaRecord, NewListItem,
    NewWatchlistEntry, SharedList, Theme, WatchStatus, WatchlistEntry,
};
use crate::realtime::{ChangeFeed, Collection};
use crate::store::{EntryOrder, WatchlistStore};
use crate::view::{self, OwnedMedia};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};

/// A confirmed watch session. Nothing is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSession {
    pub date: NaiveDate,
    pub entry_id: String,
    pub title: String,
}

pub struct Tracker<S> {
    store: Arc<S>,
    sessions: SessionProvider,
    feed: ChangeFeed,
}

impl<S: WatchlistStore> Tracker<S> {
    pub fn new(store: Arc<S>, sessions: SessionProvider, feed: ChangeFeed) -> Self {
        Self { store, sessions, feed }
    }

    pub fn sessions(&self) -> &SessionProvider {
        &self.sessions
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub async fn watchlist(&self, order: EntryOrder) -> Result<Vec<WatchlistEntry>> {
        let session = self.sessions.require()?;
        self.store.list_entries(&session, order).await
    }

    #[instrument(skip(self, media), fields(media = media.external_id))]
    pub async fn add(&self, media: &MediaRecord, status: WatchStatus) -> Result<WatchlistEntry> {
        if !status.is_recognized() {
            return Err(AppError::Validation(format!("unknown status '{}'", status)));
        }
        let session = self.sessions.require()?;
        let entry = self
            .store
            .insert_entry(&session, &NewWatchlistEntry::from_media(media, status))
            .await?;
        self.feed.notify(Collection::Watchlist, session.owner_id());
        Ok(entry)
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, entry_id: &str, update: &EntryUpdate) -> Result<WatchlistEntry> {
        if matches!(update.status, Some(WatchStatus::Unrecognized(_))) {
            return Err(AppError::Validation("unknown status".to_string()));
        }
        let session = self.sessions.require()?;
        let entry = self.store.update_entry(&session, entry_id, update).await?;
        self.feed.notify(Collection::Watchlist, session.owner_id());
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, entry_id: &str) -> Result<()> {
        let session = self.sessions.require()?;
        self.store.delete_entry(&session, entry_id).await?;
        self.feed.notify(Collection::Watchlist, session.owner_id());
        info!("Removed entry {}", entry_id);
        Ok(())
    }

    /// Flag catalog results already in the list. Signed-out callers own nothing.
    pub async fn annotate_search(&self, results: &[MediaRecord]) -> Result<Vec<OwnedMedia>> {
        let owned = match self.sessions.current() {
            Some(session) => {
                let entries = self.store.list_entries(&session, EntryOrder::default()).await?;
                view::owned_ids(&entries)
            }
            None => Default::default(),
        };
        Ok(view::mark_owned(results, &owned))
    }

    pub async fn profile_stats(&self) -> Result<ProfileStats> {
        let entries = self.watchlist(EntryOrder::default()).await?;
        Ok(aggregate::compute_profile_stats(&entries))
    }

    pub async fn estimate(&self, scope: &Scope, episode_length_minutes: u32) -> Result<RemainingEstimate> {
        let entries = self.watchlist(EntryOrder::default()).await?;
        Ok(aggregate::estimate_remaining(&entries, scope, episode_length_minutes))
    }

    pub async fn schedule(&self, entry_id: &str, date: NaiveDate) -> Result<ScheduledSession> {
        let entries = self.watchlist(EntryOrder::default()).await?;
        let entry = view::schedulable(&entries)
            .into_iter()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| {
                AppError::Validation("Please select an anime you plan to watch!".to_string())
            })?;
        info!("Scheduled '{}' for {}", entry.title, date);
        Ok(ScheduledSession {
            date,
            entry_id: entry.id.clone(),
            title: entry.title.clone(),
        })
    }

    pub async fn custom_lists(&self) -> Result<Vec<CustomWatchlist>> {
        let session = self.sessions.require()?;
        self.store.list_custom_lists(&session).await
    }

    #[instrument(skip(self, draft))]
    pub async fn create_list(&self, draft: &ListDraft) -> Result<CustomWatchlist> {
        let draft = validate_draft(draft)?;
        let session = self.sessions.require()?;
        let list = self.store.create_custom_list(&session, &draft).await?;
        self.feed.notify(Collection::CustomLists, session.owner_id());
        Ok(list)
    }

    #[instrument(skip(self, draft))]
    pub async fn update_list(&self, list_id: &str, draft: &ListDraft) -> Result<CustomWatchlist> {
        let draft = validate_draft(draft)?;
        let session = self.sessions.require()?;
        let list = self.store.update_custom_list(&session, list_id, &draft).await?;
        self.feed.notify(Collection::CustomLists, session.owner_id());
        Ok(list)
    }

    #[instrument(skip(self))]
    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        let session = self.sessions.require()?;
        self.store.delete_custom_list(&session, list_id).await?;
        self.feed.notify(Collection::CustomLists, session.owner_id());
        Ok(())
    }

    pub async fn list_detail(&self, list_id: &str) -> Result<(CustomWatchlist, Vec<CustomWatchlistItem>)> {
        let session = self.sessions.require()?;
        let list = self.store.get_custom_list(&session, list_id).await?;
        let items = self.store.list_items(&session, list_id).await?;
        Ok((list, items))
    }

    #[instrument(skip(self, media), fields(media = media.external_id))]
    pub async fn add_to_list(
        &self,
        list_id: &str,
        media: &MediaRecord,
        notes: Option<String>,
    ) -> Result<CustomWatchlistItem> {
        let session = self.sessions.require()?;
        let item = self
            .store
            .add_list_item(&session, list_id, &NewListItem::from_media(media, notes))
            .await?;
        self.feed.notify(Collection::ListItems, session.owner_id());
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn remove_from_list(&self, item_id: &str) -> Result<()> {
        let session = self.sessions.require()?;
        self.store.remove_list_item(&session, item_id).await?;
        self.feed.notify(Collection::ListItems, session.owner_id());
        Ok(())
    }

    /// Anyone may read a public list with its token, signed in or not.
    pub async fn shared(&self, share_token: &str) -> Result<SharedList> {
        self.store.shared_list(share_token.trim()).await
    }

    pub async fn theme(&self) -> Result<Theme> {
        let session = self.sessions.require()?;
        Ok(self
            .store
            .get_profile(&session)
            .await?
            .map(|p| p.theme)
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn set_theme(&self, theme: Theme) -> Result<Theme> {
        let session = self.sessions.require()?;
        let profile = self.store.upsert_theme(&session, theme).await?;
        self.feed.notify(Collection::Profile, session.owner_id());
        Ok(profile.theme)
    }
}

/// Link for a public list, e.g. `https://anilog.example/shared/<token>`.
pub fn share_link(base: &str, list: &CustomWatchlist) -> Result<Option<String>> {
    if !list.is_public {
        return Ok(None);
    }
    let base = url::Url::parse(&format!("{}/", base.trim_end_matches('/')))
        .map_err(|e| AppError::Validation(format!("invalid share base URL: {}", e)))?;
    let link = base
        .join(&format!("shared/{}", list.share_token))
        .map_err(|e| AppError::Validation(format!("invalid share token: {}", e)))?;
    Ok(Some(link.to_string()))
}

fn validate_draft(draft: &ListDraft) -> Result<ListDraft> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Please give your watchlist a name".to_string()));
    }
    Ok(ListDraft {
        name: name.to_string(),
        description: draft
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        is_public: draft.is_public,
    })
}
