use super::{EntryOrder, WatchlistStore};
use crate::auth::Session;
use crate::error::{AppError, Result};
use crate::models::{
    CustomWatchlist, CustomWatchlistItem, EntryUpdate, ListDraft, NewListItem, NewWatchlistEntry,
    SharedList, Theme, UserProfile, WatchlistEntry,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    entries: Vec<WatchlistEntry>,
    lists: Vec<CustomWatchlist>,
    items: Vec<CustomWatchlistItem>,
    profiles: Vec<UserProfile>,
}

/// In-process store with the same ownership, uniqueness and sharing rules
/// as the hosted backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Insert a row as-is, bypassing validation. Useful to simulate writes
    /// from another session or legacy data.
    pub fn seed_entry(&self, entry: WatchlistEntry) {
        self.lock().entries.push(entry);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn owned_list<'a>(tables: &'a Tables, owner: &str, id: &str) -> Result<&'a CustomWatchlist> {
    tables
        .lists
        .iter()
        .find(|l| l.id == id && l.owner_id == owner)
        .ok_or(AppError::NotFound)
}

#[async_trait]
impl WatchlistStore for MemoryStore {
    async fn list_entries(&self, session: &Session, order: EntryOrder) -> Result<Vec<WatchlistEntry>> {
        let tables = self.lock();
        let mut entries: Vec<_> = tables
            .entries
            .iter()
            .filter(|e| e.owner_id == session.owner_id())
            .cloned()
            .collect();
        match order {
            EntryOrder::RecentlyAdded => entries.sort_by(|a, b| b.added_at.cmp(&a.added_at)),
            EntryOrder::RecentlyUpdated => entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        }
        Ok(entries)
    }

    async fn insert_entry(&self, session: &Session, entry: &NewWatchlistEntry) -> Result<WatchlistEntry> {
        let mut tables = self.lock();
        let owner = session.owner_id();
        if tables
            .entries
            .iter()
            .any(|e| e.owner_id == owner && e.external_media_id == entry.external_media_id)
        {
            return Err(AppError::Duplicate);
        }

        let now = Utc::now();
        let created = WatchlistEntry {
            id: new_id(),
            owner_id: owner.to_string(),
            external_media_id: entry.external_media_id,
            title: entry.title.clone(),
            title_native: entry.title_native.clone(),
            image_url: entry.image_url.clone(),
            total_episodes: entry.total_episodes,
            episodes_watched: 0,
            status: entry.status.clone(),
            rating: None,
            notes: None,
            added_at: Some(now),
            updated_at: Some(now),
        };
        tables.entries.push(created.clone());
        Ok(created)
    }

    async fn update_entry(&self, session: &Session, id: &str, update: &EntryUpdate) -> Result<WatchlistEntry> {
        let mut tables = self.lock();
        let entry = tables
            .entries
            .iter_mut()
            .find(|e| e.id == id && e.owner_id == session.owner_id())
            .ok_or(AppError::NotFound)?;

        let resolved = update.resolve(entry);
        entry.status = resolved.status;
        entry.episodes_watched = resolved.episodes_watched;
        entry.rating = resolved.rating;
        entry.notes = resolved.notes;
        entry.updated_at = Some(Utc::now());
        Ok(entry.clone())
    }

    async fn delete_entry(&self, session: &Session, id: &str) -> Result<()> {
        let mut tables = self.lock();
        let before = tables.entries.len();
        tables
            .entries
            .retain(|e| !(e.id == id && e.owner_id == session.owner_id()));
        if tables.entries.len() == before {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn list_custom_lists(&self, session: &Session) -> Result<Vec<CustomWatchlist>> {
        let tables = self.lock();
        let mut lists: Vec<_> = tables
            .lists
            .iter()
            .filter(|l| l.owner_id == session.owner_id())
            .cloned()
            .collect();
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lists)
    }

    async fn get_custom_list(&self, session: &Session, id: &str) -> Result<CustomWatchlist> {
        let tables = self.lock();
        owned_list(&tables, session.owner_id(), id).cloned()
    }

    async fn create_custom_list(&self, session: &Session, draft: &ListDraft) -> Result<CustomWatchlist> {
        let mut tables = self.lock();
        let now = Utc::now();
        let list = CustomWatchlist {
            id: new_id(),
            owner_id: session.owner_id().to_string(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            is_public: draft.is_public,
            share_token: Uuid::new_v4().simple().to_string(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        tables.lists.push(list.clone());
        Ok(list)
    }

    async fn update_custom_list(&self, session: &Session, id: &str, draft: &ListDraft) -> Result<CustomWatchlist> {
        let mut tables = self.lock();
        let list = tables
            .lists
            .iter_mut()
            .find(|l| l.id == id && l.owner_id == session.owner_id())
            .ok_or(AppError::NotFound)?;
        list.name = draft.name.clone();
        list.description = draft.description.clone();
        list.is_public = draft.is_public;
        list.updated_at = Some(Utc::now());
        Ok(list.clone())
    }

    async fn delete_custom_list(&self, session: &Session, id: &str) -> Result<()> {
        let mut tables = self.lock();
        owned_list(&tables, session.owner_id(), id)?;
        tables.lists.retain(|l| l.id != id);
        tables.items.retain(|i| i.watchlist_id != id);
        Ok(())
    }

    async fn list_items(&self, session: &Session, list_id: &str) -> Result<Vec<CustomWatchlistItem>> {
        let tables = self.lock();
        owned_list(&tables, session.owner_id(), list_id)?;
        let mut items: Vec<_> = tables
            .items
            .iter()
            .filter(|i| i.watchlist_id == list_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(items)
    }

    async fn add_list_item(&self, session: &Session, list_id: &str, item: &NewListItem) -> Result<CustomWatchlistItem> {
        let mut tables = self.lock();
        owned_list(&tables, session.owner_id(), list_id)?;
        let created = CustomWatchlistItem {
            id: new_id(),
            watchlist_id: list_id.to_string(),
            external_media_id: item.external_media_id,
            title: item.title.clone(),
            title_native: item.title_native.clone(),
            image_url: item.image_url.clone(),
            notes: item.notes.clone(),
            added_at: Some(Utc::now()),
        };
        tables.items.push(created.clone());
        Ok(created)
    }

    async fn remove_list_item(&self, session: &Session, item_id: &str) -> Result<()> {
        let mut tables = self.lock();
        let list_id = tables
            .items
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| i.watchlist_id.clone())
            .ok_or(AppError::NotFound)?;
        owned_list(&tables, session.owner_id(), &list_id)?;
        tables.items.retain(|i| i.id != item_id);
        Ok(())
    }

    async fn shared_list(&self, share_token: &str) -> Result<SharedList> {
        let tables = self.lock();
        let list = tables
            .lists
            .iter()
            .find(|l| l.share_token == share_token && l.is_public)
            .cloned()
            .ok_or(AppError::NotFound)?;
        let mut items: Vec<_> = tables
            .items
            .iter()
            .filter(|i| i.watchlist_id == list.id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(SharedList { list, items })
    }

    async fn get_profile(&self, session: &Session) -> Result<Option<UserProfile>> {
        let tables = self.lock();
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.id == session.owner_id())
            .cloned())
    }

    async fn upsert_theme(&self, session: &Session, theme: Theme) -> Result<UserProfile> {
        let mut tables = self.lock();
        let now = Utc::now();
        if let Some(profile) = tables.profiles.iter_mut().find(|p| p.id == session.owner_id()) {
            profile.theme = theme;
            profile.updated_at = Some(now);
            return Ok(profile.clone());
        }

        let profile = UserProfile {
            id: session.owner_id().to_string(),
            email: session.user.email.clone(),
            theme,
            created_at: Some(now),
            updated_at: Some(now),
        };
        tables.profiles.push(profile.clone());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fixtures::session;
    use crate::models::fixtures::media;
    use crate::models::WatchStatus;

    fn new_entry(id: i64) -> NewWatchlistEntry {
        NewWatchlistEntry::from_media(&media(id, "Frieren"), WatchStatus::WatchLater)
    }

    fn draft(name: &str, is_public: bool) -> ListDraft {
        ListDraft { name: name.to_string(), description: None, is_public }
    }

    #[tokio::test]
    async fn duplicate_media_is_rejected_per_owner() {
        let store = MemoryStore::new();
        let alice = session("alice");
        let bob = session("bob");

        store.insert_entry(&alice, &new_entry(1)).await.unwrap();
        let again = store.insert_entry(&alice, &new_entry(1)).await;
        assert!(matches!(again, Err(AppError::Duplicate)));

        store.insert_entry(&bob, &new_entry(1)).await.unwrap();
        assert_eq!(store.list_entries(&alice, EntryOrder::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entries_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let alice = session("alice");
        let bob = session("bob");
        let created = store.insert_entry(&alice, &new_entry(1)).await.unwrap();

        assert!(store.list_entries(&bob, EntryOrder::default()).await.unwrap().is_empty());
        let update = EntryUpdate { episodes_watched: Some(3), ..Default::default() };
        assert!(matches!(
            store.update_entry(&bob, &created.id, &update).await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(store.delete_entry(&bob, &created.id).await, Err(AppError::NotFound)));

        store.delete_entry(&alice, &created.id).await.unwrap();
        assert!(store.list_entries(&alice, EntryOrder::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_applies_resolved_fields() {
        let store = MemoryStore::new();
        let alice = session("alice");
        let created = store.insert_entry(&alice, &new_entry(1)).await.unwrap();

        let update = EntryUpdate {
            status: Some(WatchStatus::Watching),
            episodes_watched: Some(50),
            rating: Some(8),
            notes: Some(" so good ".into()),
        };
        let updated = store.update_entry(&alice, &created.id, &update).await.unwrap();
        assert_eq!(updated.status, WatchStatus::Watching);
        assert_eq!(updated.episodes_watched, 12);
        assert_eq!(updated.rating, Some(8));
        assert_eq!(updated.notes.as_deref(), Some("so good"));
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn share_token_only_works_while_public() {
        let store = MemoryStore::new();
        let alice = session("alice");
        let list = store.create_custom_list(&alice, &draft("Cozy", false)).await.unwrap();
        assert!(!list.share_token.is_empty());

        assert!(matches!(store.shared_list(&list.share_token).await, Err(AppError::NotFound)));

        store
            .update_custom_list(&alice, &list.id, &draft("Cozy", true))
            .await
            .unwrap();
        store
            .add_list_item(&alice, &list.id, &NewListItem::from_media(&media(5, "Mushishi"), None))
            .await
            .unwrap();

        let shared = store.shared_list(&list.share_token).await.unwrap();
        assert_eq!(shared.list.name, "Cozy");
        assert_eq!(shared.items.len(), 1);
        assert!(matches!(store.shared_list("guess").await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn deleting_a_list_cascades_to_items() {
        let store = MemoryStore::new();
        let alice = session("alice");
        let list = store.create_custom_list(&alice, &draft("Shounen", true)).await.unwrap();
        store
            .add_list_item(&alice, &list.id, &NewListItem::from_media(&media(1, "Naruto"), None))
            .await
            .unwrap();

        store.delete_custom_list(&alice, &list.id).await.unwrap();
        assert!(matches!(store.shared_list(&list.share_token).await, Err(AppError::NotFound)));
        assert!(matches!(store.list_items(&alice, &list.id).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn other_owners_cannot_touch_list_items() {
        let store = MemoryStore::new();
        let alice = session("alice");
        let bob = session("bob");
        let list = store.create_custom_list(&alice, &draft("Mine", false)).await.unwrap();
        let item = store
            .add_list_item(&alice, &list.id, &NewListItem::from_media(&media(1, "Naruto"), None))
            .await
            .unwrap();

        let attempt = store
            .add_list_item(&bob, &list.id, &NewListItem::from_media(&media(2, "Bleach"), None))
            .await;
        assert!(matches!(attempt, Err(AppError::NotFound)));
        assert!(matches!(store.remove_list_item(&bob, &item.id).await, Err(AppError::NotFound)));
        store.remove_list_item(&alice, &item.id).await.unwrap();
    }

    #[tokio::test]
    async fn profile_is_created_on_first_theme_change() {
        let store = MemoryStore::new();
        let alice = session("alice");
        assert!(store.get_profile(&alice).await.unwrap().is_none());

        let profile = store.upsert_theme(&alice, Theme::Neon).await.unwrap();
        assert_eq!(profile.theme, Theme::Neon);
        assert_eq!(profile.email.as_deref(), Some("alice@example.com"));

        store.upsert_theme(&alice, Theme::Sakura).await.unwrap();
        let profile = store.get_profile(&alice).await.unwrap().unwrap();
        assert_eq!(profile.theme, Theme::Sakura);
    }
}
