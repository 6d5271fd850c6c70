//! Change notification: views re-fetch in full whenever their collection
//! is invalidated. There is no incremental merge.

use crate::auth::SessionProvider;
use crate::store::{EntryOrder, WatchlistStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Watchlist,
    CustomLists,
    ListItems,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub collection: Collection,
    pub owner_id: String,
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Invalidation>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn notify(&self, collection: Collection, owner_id: &str) {
        // No subscribers is fine.
        let _ = self.tx.send(Invalidation {
            collection,
            owner_id: owner_id.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.tx.subscribe()
    }
}

/// Wait for the next invalidation relevant to one view.
///
/// Returns `false` once the feed is closed. A lagged receiver has missed
/// events, so it counts as an invalidation.
pub async fn next_invalidation(
    rx: &mut broadcast::Receiver<Invalidation>,
    collection: Collection,
    owner_id: &str,
) -> bool {
    loop {
        match rx.recv().await {
            Ok(event) if event.collection == collection && event.owner_id == owner_id => {
                return true;
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Change feed lagged by {} events", skipped);
                return true;
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

/// Poll the signed-in owner's watchlist and publish an invalidation
/// whenever it changes, including changes made from other sessions.
///
/// The session is read from the provider on every tick, so refreshed
/// tokens are picked up. Ticks without a session are skipped.
pub fn spawn_watchlist_poller<S>(
    feed: ChangeFeed,
    store: Arc<S>,
    sessions: SessionProvider,
    every: Duration,
) -> JoinHandle<()>
where
    S: WatchlistStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<(String, String)> = None;
        info!("Polling watchlist every {:?}", every);

        loop {
            ticker.tick().await;

            let Some(session) = sessions.current() else {
                debug!("No session, skipping watchlist poll");
                last = None;
                continue;
            };

            let entries = match store.list_entries(&session, EntryOrder::RecentlyAdded).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Watchlist poll failed: {}", e);
                    continue;
                }
            };

            let mut sorted = entries;
            sorted.sort_by(|a, b| a.id.cmp(&b.id));
            let fingerprint = match serde_json::to_string(&sorted) {
                Ok(f) => f,
                Err(e) => {
                    warn!("Could not fingerprint watchlist: {}", e);
                    continue;
                }
            };

            let owner = session.owner_id();
            if let Some((prev_owner, prev)) = &last {
                if prev_owner == owner && *prev != fingerprint {
                    debug!("Watchlist changed remotely");
                    feed.notify(Collection::Watchlist, owner);
                }
            }
            last = Some((owner.to_string(), fingerprint));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fixtures::session;
    use crate::auth::Session;
    use crate::error::{AppError, Result};
    use crate::models::fixtures::entry;
    use crate::models::{
        CustomWatchlist, CustomWatchlistItem, EntryUpdate, ListDraft, NewListItem,
        NewWatchlistEntry, SharedList, Theme, UserProfile, WatchStatus, WatchlistEntry,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Rejects every token except the one most recently issued, like the
    /// hosted backend once a session has been refreshed.
    struct TokenCheckedStore {
        inner: MemoryStore,
        valid_token: Mutex<String>,
    }

    impl TokenCheckedStore {
        fn new(token: &str) -> Self {
            Self {
                inner: MemoryStore::new(),
                valid_token: Mutex::new(token.to_string()),
            }
        }

        fn rotate(&self, token: &str) {
            *self.valid_token.lock().unwrap() = token.to_string();
        }

        fn check(&self, session: &Session) -> Result<()> {
            if *self.valid_token.lock().unwrap() == session.access_token {
                Ok(())
            } else {
                Err(AppError::AccessDenied)
            }
        }
    }

    #[async_trait]
    impl WatchlistStore for TokenCheckedStore {
        async fn list_entries(&self, s: &Session, order: EntryOrder) -> Result<Vec<WatchlistEntry>> {
            self.check(s)?;
            self.inner.list_entries(s, order).await
        }
        async fn insert_entry(&self, s: &Session, e: &NewWatchlistEntry) -> Result<WatchlistEntry> {
            self.check(s)?;
            self.inner.insert_entry(s, e).await
        }
        async fn update_entry(&self, s: &Session, id: &str, u: &EntryUpdate) -> Result<WatchlistEntry> {
            self.check(s)?;
            self.inner.update_entry(s, id, u).await
        }
        async fn delete_entry(&self, s: &Session, id: &str) -> Result<()> {
            self.check(s)?;
            self.inner.delete_entry(s, id).await
        }
        async fn list_custom_lists(&self, s: &Session) -> Result<Vec<CustomWatchlist>> {
            self.check(s)?;
            self.inner.list_custom_lists(s).await
        }
        async fn get_custom_list(&self, s: &Session, id: &str) -> Result<CustomWatchlist> {
            self.check(s)?;
            self.inner.get_custom_list(s, id).await
        }
        async fn create_custom_list(&self, s: &Session, d: &ListDraft) -> Result<CustomWatchlist> {
            self.check(s)?;
            self.inner.create_custom_list(s, d).await
        }
        async fn update_custom_list(&self, s: &Session, id: &str, d: &ListDraft) -> Result<CustomWatchlist> {
            self.check(s)?;
            self.inner.update_custom_list(s, id, d).await
        }
        async fn delete_custom_list(&self, s: &Session, id: &str) -> Result<()> {
            self.check(s)?;
            self.inner.delete_custom_list(s, id).await
        }
        async fn list_items(&self, s: &Session, list_id: &str) -> Result<Vec<CustomWatchlistItem>> {
            self.check(s)?;
            self.inner.list_items(s, list_id).await
        }
        async fn add_list_item(&self, s: &Session, list_id: &str, i: &NewListItem) -> Result<CustomWatchlistItem> {
            self.check(s)?;
            self.inner.add_list_item(s, list_id, i).await
        }
        async fn remove_list_item(&self, s: &Session, item_id: &str) -> Result<()> {
            self.check(s)?;
            self.inner.remove_list_item(s, item_id).await
        }
        async fn shared_list(&self, token: &str) -> Result<SharedList> {
            self.inner.shared_list(token).await
        }
        async fn get_profile(&self, s: &Session) -> Result<Option<UserProfile>> {
            self.check(s)?;
            self.inner.get_profile(s).await
        }
        async fn upsert_theme(&self, s: &Session, theme: Theme) -> Result<UserProfile> {
            self.check(s)?;
            self.inner.upsert_theme(s, theme).await
        }
    }

    fn alice_entry(id: &str) -> WatchlistEntry {
        let mut e = entry(id, WatchStatus::Watching, Some(12), 1);
        e.owner_id = "alice".to_string();
        e
    }

    #[tokio::test]
    async fn views_only_wake_for_their_collection_and_owner() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        feed.notify(Collection::Profile, "alice");
        feed.notify(Collection::Watchlist, "bob");
        feed.notify(Collection::Watchlist, "alice");

        assert!(next_invalidation(&mut rx, Collection::Watchlist, "alice").await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn lagging_counts_as_invalidation() {
        let feed = ChangeFeed::new(1);
        let mut rx = feed.subscribe();
        feed.notify(Collection::Profile, "bob");
        feed.notify(Collection::Profile, "bob");

        assert!(next_invalidation(&mut rx, Collection::Watchlist, "alice").await);
    }

    #[tokio::test]
    async fn closed_feed_ends_the_wait() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();
        drop(feed);
        assert!(!next_invalidation(&mut rx, Collection::Watchlist, "alice").await);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_reports_remote_changes() {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionProvider::new(Some(session("alice")));
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        let poller = spawn_watchlist_poller(
            feed.clone(),
            Arc::clone(&store),
            sessions,
            Duration::from_secs(5),
        );

        // Let the first poll record the baseline.
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.seed_entry(alice_entry("remote"));

        let woke = tokio::time::timeout(
            Duration::from_secs(30),
            next_invalidation(&mut rx, Collection::Watchlist, "alice"),
        )
        .await;
        assert!(matches!(woke, Ok(true)));
        poller.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poller_follows_refreshed_tokens() {
        let alice = session("alice");
        let store = Arc::new(TokenCheckedStore::new(&alice.access_token));
        let sessions = SessionProvider::new(Some(alice.clone()));
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        let poller = spawn_watchlist_poller(
            feed.clone(),
            Arc::clone(&store),
            sessions.clone(),
            Duration::from_secs(5),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;

        let refreshed = Session {
            access_token: "token-alice-2".to_string(),
            ..alice
        };
        store.rotate(&refreshed.access_token);
        sessions.set(Some(refreshed));

        store.inner.seed_entry(alice_entry("remote"));

        let woke = tokio::time::timeout(
            Duration::from_secs(30),
            next_invalidation(&mut rx, Collection::Watchlist, "alice"),
        )
        .await;
        assert!(matches!(woke, Ok(true)));
        poller.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poller_idles_while_signed_out() {
        let store = Arc::new(MemoryStore::new());
        let feed = ChangeFeed::default();
        let poller = spawn_watchlist_poller(
            feed,
            Arc::clone(&store),
            SessionProvider::default(),
            Duration::from_secs(5),
        );

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(store.call_count(), 0);
        poller.abort();
    }
}
