use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{ItemId, LikeState, Reel, RemoteReel};
use crate::engagement::persistence::{read_id_set, write_id_set, KeyValueStore, LIKED_REELS_KEY, SAVED_REELS_KEY};
use crate::error::{FeedError, Result};

/// Remote engagement mutations.
#[async_trait]
pub trait EngagementApi: Send + Sync {
    /// Returns the server's authoritative like state after the toggle.
    async fn toggle_like(&self, item_id: &str) -> Result<LikeState>;

    /// Returns whether the user now follows `user_id`.
    async fn toggle_follow(&self, user_id: &str) -> Result<bool>;
}

/// An optimistic like mutation in flight, kept for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementEdit {
    pub item_id: ItemId,
    pub previous: LikeState,
    pub pending: bool,
}

#[derive(Debug, Default)]
struct EngagementState {
    likes: HashMap<ItemId, LikeState>,
    liked: BTreeSet<ItemId>,
    saved: BTreeSet<ItemId>,
    following: HashMap<String, bool>,
    edits: HashMap<ItemId, EngagementEdit>,
}

impl EngagementState {
    fn apply_like(&mut self, item_id: &str, state: LikeState) {
        self.likes.insert(item_id.to_string(), state);
        if state.is_liked {
            self.liked.insert(item_id.to_string());
        } else {
            self.liked.remove(item_id);
        }
    }
}

/// Optimistic like/save/follow state with local persistence.
///
/// In-memory state sits behind a short-lived mutex that is never held across
/// an await. Writes of the liked set go through `persist_lock` and always
/// serialize the latest in-memory set, so the last write wins with current
/// data. `toggle_save` holds `save_lock` across its read-modify-write.
pub struct EngagementStore {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn EngagementApi>,
    state: Mutex<EngagementState>,
    persist_lock: tokio::sync::Mutex<()>,
    save_lock: tokio::sync::Mutex<()>,
}

impl EngagementStore {
    pub fn new(store: Arc<dyn KeyValueStore>, api: Arc<dyn EngagementApi>) -> Self {
        Self {
            store,
            api,
            state: Mutex::new(EngagementState::default()),
            persist_lock: tokio::sync::Mutex::new(()),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads the persisted liked and saved sets.
    pub async fn load(&self) -> Result<()> {
        let liked = read_id_set(self.store.as_ref(), LIKED_REELS_KEY).await?;
        let saved = read_id_set(self.store.as_ref(), SAVED_REELS_KEY).await?;
        log::debug!("Loaded {} liked and {} saved reels", liked.len(), saved.len());

        let mut state = self.lock_state()?;
        state.liked = liked;
        state.saved = saved;
        Ok(())
    }

    // =========================================================================
    // LIKES
    // =========================================================================

    /// Merges freshly loaded reels with the persisted liked set. Reels whose
    /// liking info was omitted by the server but which are persisted as liked
    /// come back liked with at least one like. Explicit server flags update
    /// the in-memory liked set, except for reels with a toggle in flight.
    pub fn merge_loaded(&self, remote: Vec<RemoteReel>) -> Result<Vec<Reel>> {
        let mut state = self.lock_state()?;

        let reels = remote
            .into_iter()
            .map(|remote| {
                let persisted_liked = state.liked.contains(&remote.id);
                let mut reel = match (remote.is_liked, remote.likes_count) {
                    (None, count) if persisted_liked => {
                        let mut reel = remote.into_reel();
                        reel.engagement.is_liked = true;
                        reel.engagement.likes_count = count.unwrap_or(0).max(1);
                        reel
                    }
                    _ => remote.into_reel(),
                };
                if let Some(edit) = state.edits.get(&reel.id) {
                    // A toggle is in flight; keep showing its optimistic value.
                    log::debug!("Keeping optimistic like state for {} during reload", edit.item_id);
                    if let Some(current) = state.likes.get(&reel.id) {
                        reel.engagement.apply(*current);
                    }
                }
                reel
            })
            .collect::<Vec<_>>();

        // The liked set follows the merged flags so the next persist writes
        // what the feed shows.
        for reel in &reels {
            if !state.edits.contains_key(&reel.id) {
                state.apply_like(&reel.id, reel.engagement.like_state());
            }
        }
        Ok(reels)
    }

    pub fn like_state(&self, item_id: &str) -> Option<LikeState> {
        self.lock_state().ok()?.likes.get(item_id).copied()
    }

    pub fn is_pending(&self, item_id: &str) -> bool {
        self.lock_state()
            .map(|state| state.edits.contains_key(item_id))
            .unwrap_or(false)
    }

    pub fn liked_ids(&self) -> BTreeSet<ItemId> {
        self.lock_state().map(|state| state.liked.clone()).unwrap_or_default()
    }

    /// Optimistically toggles a like, confirms it remotely and rolls back on
    /// failure. Returns `Ok(None)` when a toggle for the same item is still
    /// in flight and this one was ignored.
    pub async fn toggle_like(&self, item_id: &str) -> Result<Option<LikeState>> {
        let edit = {
            let mut state = self.lock_state()?;
            if state.edits.contains_key(item_id) {
                log::debug!("Like toggle for {} already pending, ignoring", item_id);
                return Ok(None);
            }
            let previous = state
                .likes
                .get(item_id)
                .copied()
                .ok_or_else(|| FeedError::UnknownItem(item_id.to_string()))?;

            state.apply_like(item_id, previous.toggled());
            let edit = EngagementEdit {
                item_id: item_id.to_string(),
                previous,
                pending: true,
            };
            state.edits.insert(item_id.to_string(), edit.clone());
            edit
        };

        self.persist_liked().await;

        let result = self.api.toggle_like(item_id).await;

        let outcome = {
            let mut state = self.lock_state()?;
            state.edits.remove(item_id);
            match result {
                Ok(server) => {
                    state.apply_like(item_id, server);
                    Ok(Some(server))
                }
                Err(e) => {
                    log::warn!("Like toggle for {} failed, rolling back: {}", item_id, e);
                    state.apply_like(item_id, edit.previous);
                    Err(e)
                }
            }
        };

        self.persist_liked().await;
        outcome
    }

    // =========================================================================
    // SAVES
    // =========================================================================

    /// Flips membership of `item_id` in the persisted saved set. The write is
    /// derived from a fresh read, never from the in-memory copy. Returns
    /// whether the item is now saved.
    pub async fn toggle_save(&self, item_id: &str) -> Result<bool> {
        let _guard = self.save_lock.lock().await;

        let mut saved = read_id_set(self.store.as_ref(), SAVED_REELS_KEY).await?;
        let now_saved = if saved.remove(item_id) {
            false
        } else {
            saved.insert(item_id.to_string());
            true
        };
        write_id_set(self.store.as_ref(), SAVED_REELS_KEY, &saved).await?;

        self.lock_state()?.saved = saved;
        log::debug!("Reel {} saved: {}", item_id, now_saved);
        Ok(now_saved)
    }

    pub fn is_saved(&self, item_id: &str) -> bool {
        self.lock_state()
            .map(|state| state.saved.contains(item_id))
            .unwrap_or(false)
    }

    // =========================================================================
    // FOLLOWS
    // =========================================================================

    pub fn is_following(&self, user_id: &str) -> bool {
        self.lock_state()
            .ok()
            .and_then(|state| state.following.get(user_id).copied())
            .unwrap_or(false)
    }

    /// Optimistic follow toggle with rollback. Not persisted locally.
    pub async fn toggle_follow(&self, user_id: &str) -> Result<bool> {
        let previous = {
            let mut state = self.lock_state()?;
            let previous = state.following.get(user_id).copied().unwrap_or(false);
            state.following.insert(user_id.to_string(), !previous);
            previous
        };

        let result = self.api.toggle_follow(user_id).await;

        let mut state = self.lock_state()?;
        match result {
            Ok(following) => {
                state.following.insert(user_id.to_string(), following);
                Ok(following)
            }
            Err(e) => {
                log::warn!("Follow toggle for {} failed, rolling back: {}", user_id, e);
                state.following.insert(user_id.to_string(), previous);
                Err(e)
            }
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn persist_liked(&self) {
        let _guard = self.persist_lock.lock().await;
        let liked = self.liked_ids();
        if let Err(e) = write_id_set(self.store.as_ref(), LIKED_REELS_KEY, &liked).await {
            log::warn!("Failed to persist liked reels: {}", e);
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, EngagementState>> {
        self.state
            .lock()
            .map_err(|_| FeedError::Persistence("engagement state poisoned".to_string()))
    }
}
