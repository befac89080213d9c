use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::audio::{stop_ambient, AmbientAudio};
use crate::core::{FeedEvent, LikeState, RemoteReel};
use crate::engagement::EngagementStore;
use crate::error::Result;
use crate::feed::{FeedController, HostCommand};

/// Source of feed pages.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch_reels(&self, page: usize, page_size: usize) -> Result<Vec<RemoteReel>>;

    async fn fetch_reel(&self, item_id: &str) -> Result<RemoteReel>;

    async fn delete_reel(&self, item_id: &str) -> Result<()>;
}

/// Couples a [`FeedController`] with its async collaborators: pages come
/// from the provider, likes and saves go through the engagement store and
/// stop requests go to the ambient audio session.
pub struct FeedSession {
    controller: FeedController,
    provider: Arc<dyn FeedProvider>,
    engagement: Arc<EngagementStore>,
    audio: Arc<dyn AmbientAudio>,
    next_page: usize,
    exhausted: bool,
}

impl FeedSession {
    pub fn new(
        controller: FeedController,
        provider: Arc<dyn FeedProvider>,
        engagement: Arc<EngagementStore>,
        audio: Arc<dyn AmbientAudio>,
    ) -> Self {
        Self {
            controller,
            provider,
            engagement,
            audio,
            next_page: 0,
            exhausted: false,
        }
    }

    pub fn controller(&self) -> &FeedController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut FeedController {
        &mut self.controller
    }

    pub fn engagement(&self) -> &EngagementStore {
        &self.engagement
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Fetches the first page and replaces the feed. Returns the reel count.
    pub async fn reload(&mut self, now: Instant) -> Result<usize> {
        let page_size = self.controller.config().page_size;
        let remote = self.provider.fetch_reels(0, page_size).await?;
        let count = remote.len();

        let reels = self.engagement.merge_loaded(remote)?;
        self.controller.set_reels(reels, now);
        self.next_page = 1;
        self.exhausted = count == 0 || count < page_size;
        Ok(count)
    }

    /// Fetches the next page, if any. Returns how many reels arrived.
    pub async fn load_more(&mut self, now: Instant) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        let page_size = self.controller.config().page_size;
        let remote = self.provider.fetch_reels(self.next_page, page_size).await?;
        let count = remote.len();

        let reels = self.engagement.merge_loaded(remote)?;
        self.controller.append_reels(reels, now);
        self.next_page += 1;
        self.exhausted = count == 0 || count < page_size;
        log::debug!("Loaded page {} with {} reels", self.next_page - 1, count);
        Ok(count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Refetches one reel for a new locator and remounts it.
    pub async fn refresh_locator(&mut self, item_id: &str, now: Instant) -> Result<()> {
        match self.provider.fetch_reel(item_id).await {
            Ok(remote) => {
                let Some(reel) = self.engagement.merge_loaded(vec![remote])?.pop() else {
                    return Ok(());
                };
                self.controller.on_locator_refreshed(reel, now);
                Ok(())
            }
            Err(e) => {
                log::warn!("Locator refresh for {} failed: {}", item_id, e);
                self.controller.on_locator_refresh_failed(item_id, now);
                Err(e)
            }
        }
    }

    pub async fn delete_reel(&mut self, item_id: &str, now: Instant) -> Result<()> {
        self.provider.delete_reel(item_id).await?;
        self.controller.remove_reel(item_id, now);
        log::info!("Deleted reel {}", item_id);
        Ok(())
    }

    // =========================================================================
    // ENGAGEMENT
    // =========================================================================

    /// Toggles a like and mirrors the outcome into the feed. A failed remote
    /// call leaves the rolled-back state and a notice for the user.
    pub async fn toggle_like(&mut self, item_id: &str) -> Result<Option<LikeState>> {
        match self.engagement.toggle_like(item_id).await {
            Ok(Some(state)) => {
                self.controller.apply_like(item_id, state);
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                if let Some(previous) = self.engagement.like_state(item_id) {
                    self.controller.apply_like(item_id, previous);
                }
                self.controller.push_notice("Couldn't update like. Try again.");
                Err(e)
            }
        }
    }

    pub async fn toggle_save(&mut self, item_id: &str) -> Result<bool> {
        self.engagement.toggle_save(item_id).await
    }

    pub async fn toggle_follow(&mut self, user_id: &str) -> Result<bool> {
        let result = self.engagement.toggle_follow(user_id).await;
        if result.is_err() {
            self.controller.push_notice("Couldn't update follow. Try again.");
        }
        result
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Handles a push invalidation, reloading unless the feed is filtered to
    /// one owner. Returns the commands left for the host.
    pub async fn handle_event(&mut self, event: &FeedEvent, now: Instant) -> Result<Vec<HostCommand>> {
        if !self.controller.on_feed_event(event) {
            return Ok(Vec::new());
        }
        self.pump(now).await
    }

    /// Drains controller commands, carrying out the ones this session owns
    /// (reloads, locator refreshes, ambient audio) and returning the rest for
    /// the host.
    pub async fn pump(&mut self, now: Instant) -> Result<Vec<HostCommand>> {
        let mut for_host = Vec::new();

        loop {
            let commands = self.controller.drain_commands();
            if commands.is_empty() {
                return Ok(for_host);
            }

            for command in commands {
                match command {
                    HostCommand::Reload => {
                        self.reload(now).await?;
                    }
                    HostCommand::RefreshLocator(item_id) => {
                        // Failure already scheduled a retry.
                        let _ = self.refresh_locator(&item_id, now).await;
                    }
                    HostCommand::StopAmbientAudio => {
                        stop_ambient(self.audio.as_ref()).await;
                    }
                    other => for_host.push(other),
                }
            }
        }
    }
}
