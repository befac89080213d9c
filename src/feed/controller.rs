// =============================================================================
// FEED CONTROLLER - ORCHESTRATION OF THE PLAYBACK CORE
// =============================================================================
//
// Owns the display sequence and every playback component, and advances them
// in response to host callbacks. Nothing here performs I/O: effects are
// queued as HostCommand values and collected with `drain_commands`.
//
// FLOW:
// - Viewport samples -> ViewportTracker -> visible index change
// - Visible index change -> ResourceLifecycleManager window + PlaybackArbiter
// - Mount requests take their locator from UrlCache
// - AdInterleaver owns the display index mapping used by the viewport and
//   DeepLinkScroller
// - Gestures and deep links run beside the playback core
//
// =============================================================================

use std::time::{Duration, Instant};

use crate::ads::{AdInterleaver, DisplaySequence};
use crate::core::{FeedConfig, FeedEvent, FeedItem, ItemId, LikeState, Reel};
use crate::feed::{DeepLinkScroller, DeepLinkStep, ScrollResult};
use crate::gestures::{GestureNavigator, GestureOutcome};
use crate::playback::{
    BackAction, LifecycleEvent, LoadErrorOutcome, PlaybackArbiter, ResourceCommand, ResourceEvent,
    ResourceLifecycleManager, UrlCache, ViewportTracker, VisibleIndexChange,
};

// =============================================================================
// HOST COMMANDS
// =============================================================================

/// Effects the host must carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Decoder layer instruction; completions come back as [`ResourceEvent`]
    Resource(ResourceCommand),
    /// Stop every ambient music track
    StopAmbientAudio,
    /// Push a route
    Navigate(String),
    /// Scroll the list; report back with `on_scroll_result`
    ScrollToIndex(usize),
    /// Refetch the whole feed
    Reload,
    /// Refetch one reel for a fresh locator; report back with
    /// `on_locator_refreshed` or `on_locator_refresh_failed`
    RefreshLocator(ItemId),
    /// A remount is scheduled; call `tick` once `after` has elapsed
    RetryLoad { item_id: ItemId, after: Duration },
    /// Transient, non-blocking message for the user
    Notice(String),
}

#[derive(Debug, Clone, PartialEq)]
struct PendingRetry {
    item_id: ItemId,
    due: Instant,
}

pub struct FeedController {
    config: FeedConfig,
    reels: Vec<Reel>,
    sequence: DisplaySequence,
    viewport: ViewportTracker,
    arbiter: PlaybackArbiter,
    resources: ResourceLifecycleManager,
    cache: UrlCache,
    interleaver: AdInterleaver,
    gestures: GestureNavigator,
    deep_link: DeepLinkScroller,
    deep_link_due: Option<Instant>,
    /// Display index the mount window is centered on.
    window_center: Option<usize>,
    /// Set when the feed shows a single owner's reels; push invalidations
    /// are ignored then.
    owner_filter: Option<String>,
    ads_eligible: bool,
    retries: Vec<PendingRetry>,
    commands: Vec<HostCommand>,
}

impl FeedController {
    pub fn new(config: FeedConfig, now: Instant) -> Self {
        Self {
            viewport: ViewportTracker::new(&config.viewport),
            arbiter: PlaybackArbiter::new(),
            resources: ResourceLifecycleManager::new(&config.resources),
            cache: UrlCache::new(&config.url_cache),
            interleaver: AdInterleaver::new(config.ads.clone(), now),
            gestures: GestureNavigator::new(&config.gestures),
            deep_link: DeepLinkScroller::new(&config.deep_link),
            deep_link_due: None,
            window_center: None,
            owner_filter: None,
            ads_eligible: false,
            reels: Vec::new(),
            sequence: DisplaySequence::default(),
            retries: Vec::new(),
            commands: Vec::new(),
            config,
        }
    }

    pub fn with_owner_filter(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_filter = Some(owner_id.into());
        self
    }

    // =========================================================================
    // FEED CONTENT
    // =========================================================================

    /// Replaces the loaded reels, e.g. after a full reload.
    pub fn set_reels(&mut self, reels: Vec<Reel>, now: Instant) {
        log::info!(
            "Feed loaded with {} reels (ad session {})",
            reels.len(),
            self.interleaver.session().session_id
        );
        self.reels = reels;
        self.rebuild(now);
    }

    pub fn append_reels(&mut self, reels: Vec<Reel>, now: Instant) {
        let known: std::collections::HashSet<&str> = self.reels.iter().map(|reel| reel.id.as_str()).collect();
        let fresh: Vec<Reel> = reels
            .into_iter()
            .filter(|reel| !known.contains(reel.id.as_str()))
            .collect();
        if fresh.is_empty() {
            return;
        }
        log::debug!("Appending {} reels", fresh.len());
        self.reels.extend(fresh);
        self.rebuild(now);
    }

    pub fn remove_reel(&mut self, item_id: &str, now: Instant) -> bool {
        let before = self.reels.len();
        self.reels.retain(|reel| reel.id != item_id);
        if self.reels.len() == before {
            return false;
        }

        let mut out = Vec::new();
        self.resources.teardown(item_id, self.arbiter.version(), &mut out);
        self.arbiter.on_unloaded(item_id);
        self.cache.invalidate(item_id);
        self.retries.retain(|retry| retry.item_id != item_id);
        self.push_resources(out);
        self.rebuild(now);
        true
    }

    /// Replaces a reel's data in place without rebuilding the sequence.
    pub fn update_reel(&mut self, reel: Reel) -> bool {
        let Some(existing) = self.reels.iter_mut().find(|existing| existing.id == reel.id) else {
            return false;
        };
        *existing = reel.clone();
        if let Some(displayed) = self.sequence.reel_mut(&reel.id) {
            *displayed = reel;
        }
        true
    }

    /// Applies a like state decided by the engagement store.
    pub fn apply_like(&mut self, item_id: &str, state: LikeState) {
        if let Some(reel) = self.reels.iter_mut().find(|reel| reel.id == item_id) {
            reel.engagement.apply(state);
        }
        if let Some(reel) = self.sequence.reel_mut(item_id) {
            reel.engagement.apply(state);
        }
    }

    /// Returns true when the event should trigger a full reload, which is
    /// then queued as [`HostCommand::Reload`].
    pub fn on_feed_event(&mut self, event: &FeedEvent) -> bool {
        if let Some(owner) = &self.owner_filter {
            log::debug!("Ignoring {} while filtered to owner {}", event.name(), owner);
            return false;
        }
        log::debug!("Feed event {} triggers reload", event.name());
        self.commands.push(HostCommand::Reload);
        true
    }

    // =========================================================================
    // VIEWPORT AND TIME
    // =========================================================================

    pub fn on_viewport_sample(&mut self, index: usize, visible_fraction: f32, now: Instant) {
        if let Some(change) = self.viewport.on_sample(index, visible_fraction, now) {
            self.apply_visible_change(change, now);
        }
    }

    /// Advances time-based state: viewport dwell, gesture guard, load
    /// retries, deep link retries and ad eligibility.
    pub fn tick(&mut self, now: Instant) {
        if let Some(change) = self.viewport.tick(now) {
            self.apply_visible_change(change, now);
        }
        self.gestures.tick(now);

        let due: Vec<ItemId> = self
            .retries
            .iter()
            .filter(|retry| retry.due <= now)
            .map(|retry| retry.item_id.clone())
            .collect();
        if !due.is_empty() {
            self.retries.retain(|retry| retry.due > now);
            log::debug!("Retrying load of {:?}", due);
            self.sync_window(now);
        }

        if self.deep_link_due.map(|due| due <= now).unwrap_or(false) {
            self.deep_link_due = None;
            if let Some(request) = self.deep_link.retry_request(&self.reels, &self.sequence, &self.interleaver) {
                self.commands.push(HostCommand::ScrollToIndex(request.display_index));
            }
        }

        self.refresh_ad_eligibility(now);
    }

    // =========================================================================
    // RESOURCE EVENTS
    // =========================================================================

    pub fn on_resource_event(&mut self, event: ResourceEvent, now: Instant) {
        let mut out = Vec::new();

        match event {
            ResourceEvent::Mounted { item_id } => {
                if self.resources.on_mounted(&item_id, &mut out) {
                    self.arbiter.on_mounted(&item_id, &self.resources, &mut out);
                }
            }
            ResourceEvent::LoadFailed { item_id, error } => {
                let is_active = self.arbiter.is_active(&item_id);
                let outcome = self
                    .resources
                    .on_load_error(&item_id, &error, is_active, &mut self.cache, &mut out);
                self.arbiter.on_unloaded(&item_id);

                match outcome {
                    LoadErrorOutcome::RefreshLocator => {
                        self.commands.push(HostCommand::RefreshLocator(item_id));
                    }
                    LoadErrorOutcome::RetryAfter(after) => {
                        self.schedule_retry(item_id, after, now);
                    }
                    LoadErrorOutcome::Unmounted => {}
                }
            }
            ResourceEvent::PlayCompleted { token, result } => {
                self.arbiter.on_play_completed(&token, result, &mut out);
            }
            ResourceEvent::PauseCompleted { token, result } => {
                self.arbiter.on_pause_completed(&token, result);
            }
            ResourceEvent::TeardownFailed { item_id, error } => {
                self.resources.on_teardown_failed(&item_id, &error);
            }
        }

        self.push_resources(out);
    }

    /// A fresh copy of the reel arrived; drop the old locator and remount.
    pub fn on_locator_refreshed(&mut self, reel: Reel, now: Instant) {
        let item_id = reel.id.clone();
        self.update_reel(reel);
        self.cache.invalidate(&item_id);
        self.resources.clear_refresh(&item_id);
        self.sync_window(now);
    }

    /// The refetch failed; fall back to the transient retry path.
    pub fn on_locator_refresh_failed(&mut self, item_id: &str, now: Instant) {
        self.resources.clear_refresh(item_id);
        let after = self.config.resources.transient_retry_delay();
        self.schedule_retry(item_id.to_string(), after, now);
    }

    // =========================================================================
    // LIFECYCLE, ADS, GESTURES, DEEP LINKS
    // =========================================================================

    pub fn on_lifecycle(&mut self, event: LifecycleEvent) -> Option<BackAction> {
        let mut out = Vec::new();
        let outcome = self.arbiter.on_lifecycle(event, &self.resources, &mut out);
        self.push_resources(out);

        if outcome.stop_ambient_audio {
            self.commands.push(HostCommand::StopAmbientAudio);
        }
        if event == LifecycleEvent::ScreenFocus {
            self.gestures.on_focus();
        }
        outcome.back
    }

    /// Reported by the ad renderer. Rebuilds the sequence when the
    /// impression consumed budget.
    pub fn on_ad_impression(&mut self, ad_index: usize, now: Instant) -> bool {
        let counted = self.interleaver.on_impression(ad_index, now);
        if counted {
            self.rebuild(now);
        }
        counted
    }

    pub fn touch_start(&mut self, x: f32, y: f32) {
        self.gestures.touch_start(x, y);
    }

    pub fn touch_move(&mut self, x: f32, y: f32) -> f32 {
        self.gestures.touch_move(x, y)
    }

    /// A triggered swipe opens the active reel owner's profile.
    pub fn touch_end(&mut self, x: f32, y: f32, now: Instant) -> GestureOutcome {
        let outcome = self.gestures.touch_end(x, y, now);
        if outcome == GestureOutcome::Navigate {
            match self.active_reel().map(|reel| reel.owner_id.clone()) {
                Some(owner_id) => {
                    let path = format!("/profile/{}", owner_id);
                    log::debug!("Swipe navigates to {}", path);
                    self.commands.push(HostCommand::Navigate(path));
                }
                None => log::debug!("Swipe triggered with no active reel"),
            }
        }
        outcome
    }

    pub fn gesture_progress(&self, now: Instant) -> f32 {
        self.gestures.progress(now)
    }

    /// Starts scrolling to a deep-linked reel. Returns false if the reel is
    /// not loaded.
    pub fn open_deep_link(&mut self, target_id: &str) -> bool {
        self.deep_link_due = None;
        match self
            .deep_link
            .begin(target_id, &self.reels, &self.sequence, &self.interleaver)
        {
            Some(request) => {
                self.commands.push(HostCommand::ScrollToIndex(request.display_index));
                true
            }
            None => false,
        }
    }

    pub fn on_scroll_result(&mut self, result: ScrollResult, now: Instant) -> DeepLinkStep {
        let step = self.deep_link.on_scroll_result(result);
        if let DeepLinkStep::RetryAfter(delay) = step {
            self.deep_link_due = Some(now + delay);
        }
        step
    }

    /// Releases everything; the next visit starts a fresh ad session.
    pub fn close(&mut self, now: Instant) {
        let mut out = Vec::new();
        for item_id in self.resources.teardown_all(self.arbiter.version(), &mut out) {
            self.arbiter.on_unloaded(&item_id);
        }
        self.push_resources(out);
        self.arbiter.reset();
        self.viewport.reset();
        self.window_center = None;
        self.deep_link.cancel();
        self.deep_link_due = None;
        self.retries.clear();
        self.interleaver.reset(now);
        self.ads_eligible = false;
        self.commands.push(HostCommand::StopAmbientAudio);
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.commands.push(HostCommand::Notice(text.into()));
    }

    pub fn drain_commands(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.commands)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn reels(&self) -> &[Reel] {
        &self.reels
    }

    pub fn reel(&self, item_id: &str) -> Option<&Reel> {
        self.reels.iter().find(|reel| reel.id == item_id)
    }

    pub fn sequence(&self) -> &DisplaySequence {
        &self.sequence
    }

    pub fn arbiter(&self) -> &PlaybackArbiter {
        &self.arbiter
    }

    pub fn resources(&self) -> &ResourceLifecycleManager {
        &self.resources
    }

    pub fn cache(&self) -> &UrlCache {
        &self.cache
    }

    pub fn interleaver(&self) -> &AdInterleaver {
        &self.interleaver
    }

    pub fn current_index(&self) -> Option<usize> {
        self.viewport.current()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.arbiter.active_id()
    }

    pub fn active_reel(&self) -> Option<&Reel> {
        self.active_id().and_then(|id| self.reel(id))
    }

    pub fn is_navigating(&self) -> bool {
        self.gestures.is_navigating()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn apply_visible_change(&mut self, change: VisibleIndexChange, now: Instant) {
        if let Some(FeedItem::Reel(reel)) = self.sequence.get(change.next) {
            let reel_id = reel.id.clone();
            if self.interleaver.record_reel_watched(&reel_id) {
                log::trace!("Reels watched: {}", self.interleaver.session().reels_watched);
            }
        }

        let mut out = Vec::new();
        self.sync_window_at(Some(change.next), now, &mut out);
        self.arbiter.on_visible_index_changed(
            change.previous,
            change.next,
            &self.sequence,
            &mut self.resources,
            &mut out,
        );
        self.push_resources(out);

        self.refresh_ad_eligibility(now);
    }

    fn refresh_ad_eligibility(&mut self, now: Instant) {
        let eligible = self.interleaver.is_eligible(now);
        if eligible != self.ads_eligible {
            self.ads_eligible = eligible;
            if eligible {
                log::info!("Ads eligible in session {}", self.interleaver.session().session_id);
            }
            self.rebuild(now);
        }
    }

    /// Rebuilds the display sequence and keeps the active item, the viewport
    /// and the mount window pointing at the same reel.
    fn rebuild(&mut self, now: Instant) {
        let previous_index = self.viewport.current();
        let previous_item = previous_index.and_then(|index| self.sequence.get(index)).cloned();

        self.sequence = self.interleaver.build(&self.reels, now);
        self.ads_eligible = self.interleaver.is_eligible(now);

        let mut out = Vec::new();
        self.arbiter.on_sequence_rebuilt(&self.sequence, &mut out);
        self.push_resources(out);

        let located = match (self.arbiter.active(), previous_item) {
            (Some(active), _) => Some(active.display_index),
            (None, Some(FeedItem::Reel(reel))) => self.sequence.position_of(&reel.id),
            (None, Some(FeedItem::AdSlot { ad_index })) => self
                .sequence
                .items()
                .iter()
                .position(|item| *item == FeedItem::AdSlot { ad_index }),
            (None, None) => None,
        };
        // If the visible item disappeared, keep the window where it was; the
        // next sample at that position is reported as a fresh change.
        self.window_center = match (located, previous_index) {
            (Some(index), _) => Some(index),
            (None, Some(index)) if !self.sequence.is_empty() => Some(index.min(self.sequence.len() - 1)),
            _ => None,
        };
        self.viewport.set_current(located);
        self.sync_window(now);
    }

    fn sync_window(&mut self, now: Instant) {
        let mut out = Vec::new();
        self.sync_window_at(self.window_center, now, &mut out);
        if let Some(active) = self.arbiter.active_id().map(str::to_string) {
            self.resources.set_active(Some(&active));
        }
        self.push_resources(out);
    }

    fn sync_window_at(&mut self, center: Option<usize>, now: Instant, out: &mut Vec<ResourceCommand>) {
        self.window_center = center;
        let change = self.resources.sync_window(
            center,
            &self.sequence,
            &mut self.cache,
            &self.config.quality_hint,
            self.arbiter.version(),
            now,
            out,
        );
        for item_id in &change.mounted {
            self.arbiter.on_mount_requested(item_id);
        }
        for item_id in &change.unmounted {
            self.arbiter.on_unloaded(item_id);
        }
    }

    fn schedule_retry(&mut self, item_id: ItemId, after: Duration, now: Instant) {
        self.retries.retain(|retry| retry.item_id != item_id);
        self.retries.push(PendingRetry {
            item_id: item_id.clone(),
            due: now + after,
        });
        self.commands.push(HostCommand::RetryLoad { item_id, after });
    }

    fn push_resources(&mut self, out: Vec<ResourceCommand>) {
        self.commands.extend(out.into_iter().map(HostCommand::Resource));
    }
}
