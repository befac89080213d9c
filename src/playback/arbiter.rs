// =============================================================================
// PLAYBACK ARBITER - SINGLE ACTIVE ITEM
// =============================================================================
//
// Decides which one feed item may play. All play/pause requests go out as
// commands tagged with a PlaybackToken; completions come back asynchronously
// and are applied only if the token still names the active item at the
// current version. The version is bumped on every change of the active item
// and on every forced pause, so a completion that raced with a scroll or a
// lifecycle change can never resurrect playback.
//
// =============================================================================

use std::collections::{HashMap, VecDeque};

use crate::ads::DisplaySequence;
use crate::core::{FeedItem, ItemId};
use crate::playback::{
    BackAction, LifecycleEvent, PlaybackState, PlaybackToken, ResourceCommand, ResourceLifecycleManager,
    Transition,
};

/// Most recent transitions kept for observers.
pub const TRANSITION_HISTORY: usize = 64;

/// The item currently authorized to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveItem {
    pub id: ItemId,
    pub display_index: usize,
}

/// Side effects of a lifecycle event beyond resource commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub stop_ambient_audio: bool,
    pub back: Option<BackAction>,
}

pub struct PlaybackArbiter {
    active: Option<ActiveItem>,
    version: u64,
    states: HashMap<ItemId, PlaybackState>,
    /// Play request waiting for the active item's mount to finish.
    deferred_play: Option<PlaybackToken>,
    /// Item paused by background/blur, resumed only if still active.
    suspended: Option<ItemId>,
    app_active: bool,
    screen_focused: bool,
    transitions: VecDeque<Transition>,
}

impl PlaybackArbiter {
    pub fn new() -> Self {
        Self {
            active: None,
            version: 0,
            states: HashMap::new(),
            deferred_play: None,
            suspended: None,
            app_active: true,
            screen_focused: true,
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
        }
    }

    // =========================================================================
    // VIEWPORT
    // =========================================================================

    pub fn on_visible_index_changed(
        &mut self,
        prev: Option<usize>,
        next: usize,
        sequence: &DisplaySequence,
        resources: &mut ResourceLifecycleManager,
        out: &mut Vec<ResourceCommand>,
    ) {
        match sequence.get(next) {
            None => {
                log::warn!("Visible index {} is outside the display sequence ({} items)", next, sequence.len());
            }
            Some(FeedItem::AdSlot { ad_index }) => {
                log::debug!("Ad slot {} visible at {}, pausing all reels", ad_index, next);
                self.bump_version();
                self.pause_all(out);
                self.active = None;
                self.deferred_play = None;
                self.suspended = None;
                resources.set_active(None);
            }
            Some(FeedItem::Reel(reel)) => {
                if self.active.as_ref().map(|active| active.id.as_str()) == Some(reel.id.as_str()) {
                    if let Some(active) = self.active.as_mut() {
                        active.display_index = next;
                    }
                    return;
                }

                if let Some(FeedItem::Reel(prev_reel)) = prev.and_then(|index| sequence.get(index)) {
                    self.force_pause(&prev_reel.id, out);
                }
                if let Some(active) = self.active.clone() {
                    self.force_pause(&active.id, out);
                }

                self.bump_version();
                log::debug!("Active item is now {} (display index {})", reel.id, next);
                self.active = Some(ActiveItem {
                    id: reel.id.clone(),
                    display_index: next,
                });
                resources.set_active(Some(&reel.id));

                if self.is_suspended() {
                    // Resume the item the user actually landed on.
                    self.suspended = Some(reel.id.clone());
                    self.deferred_play = None;
                } else {
                    self.request_play(resources, out);
                }
            }
        }
    }

    /// Re-synchronizes the active display index after the sequence was
    /// rebuilt. Clears the active item if it disappeared.
    pub fn on_sequence_rebuilt(&mut self, sequence: &DisplaySequence, out: &mut Vec<ResourceCommand>) {
        let Some(active) = self.active.clone() else {
            return;
        };
        match sequence.position_of(&active.id) {
            Some(index) => {
                if let Some(active) = self.active.as_mut() {
                    active.display_index = index;
                }
            }
            None => {
                log::debug!("Active item {} left the feed", active.id);
                self.force_pause(&active.id, out);
                self.bump_version();
                self.active = None;
                self.deferred_play = None;
                self.suspended = None;
            }
        }
    }

    // =========================================================================
    // RESOURCE EVENTS
    // =========================================================================

    pub fn on_mount_requested(&mut self, item_id: &str) {
        self.set_state(item_id, PlaybackState::Loading);
    }

    /// A mount completed. Starts the deferred play if it is still current;
    /// other items settle as loaded-but-paused.
    pub fn on_mounted(&mut self, item_id: &str, resources: &ResourceLifecycleManager, out: &mut Vec<ResourceCommand>) {
        let deferred_matches = self
            .deferred_play
            .as_ref()
            .map(|token| token.item_id == item_id && self.is_current(token))
            .unwrap_or(false);

        if deferred_matches {
            self.deferred_play = None;
            self.request_play(resources, out);
        } else if self.state_of(item_id) == PlaybackState::Loading && !self.is_active(item_id) {
            self.set_state(item_id, PlaybackState::Paused);
        }
    }

    /// The item's resource is gone. If it is still the active item, playback
    /// is re-requested once it is mounted again.
    pub fn on_unloaded(&mut self, item_id: &str) {
        if self.states.contains_key(item_id) {
            self.set_state(item_id, PlaybackState::Unloaded);
        }
        if self.is_active(item_id) && !self.is_suspended() {
            self.deferred_play = Some(self.token_for(item_id));
        } else if self.deferred_play.as_ref().map(|token| token.item_id.as_str()) == Some(item_id) {
            self.deferred_play = None;
        }
    }

    /// Applies a play completion only if its token is still current.
    pub fn on_play_completed(&mut self, token: &PlaybackToken, result: Result<(), String>, out: &mut Vec<ResourceCommand>) {
        if !self.is_current(token) {
            log::debug!(
                "Discarding stale play completion for {} (version {}, current {})",
                token.item_id,
                token.version,
                self.version
            );
            if result.is_ok() {
                // The decoder may be running; silence it.
                out.push(ResourceCommand::Pause {
                    token: PlaybackToken {
                        item_id: token.item_id.clone(),
                        version: self.version,
                    },
                });
            }
            return;
        }

        match result {
            Ok(()) => self.set_state(&token.item_id, PlaybackState::Playing),
            Err(e) => {
                log::warn!("Play failed for {}: {}", token.item_id, e);
                self.set_state(&token.item_id, PlaybackState::Paused);
            }
        }
    }

    pub fn on_pause_completed(&mut self, token: &PlaybackToken, result: Result<(), String>) {
        if let Err(e) = result {
            // Pause is best-effort; the arbiter's state is already Paused.
            log::debug!("Pause of {} reported an error: {}", token.item_id, e);
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    pub fn on_lifecycle(
        &mut self,
        event: LifecycleEvent,
        resources: &ResourceLifecycleManager,
        out: &mut Vec<ResourceCommand>,
    ) -> LifecycleOutcome {
        let mut outcome = LifecycleOutcome::default();

        match event {
            LifecycleEvent::AppBackground | LifecycleEvent::AppInactive => {
                self.app_active = false;
                self.suspend_active(out);
                outcome.stop_ambient_audio = true;
            }
            LifecycleEvent::ScreenBlur => {
                self.screen_focused = false;
                self.suspend_active(out);
                outcome.stop_ambient_audio = true;
            }
            LifecycleEvent::AppForeground => {
                self.app_active = true;
                self.try_resume(resources, out);
            }
            LifecycleEvent::ScreenFocus => {
                self.screen_focused = true;
                self.try_resume(resources, out);
            }
            LifecycleEvent::HardwareBack => {
                if let Some(active) = self.active.clone() {
                    self.force_pause(&active.id, out);
                    self.bump_version();
                }
                outcome.back = Some(BackAction::Proceed);
            }
        }

        outcome
    }

    // =========================================================================
    // STATE QUERIES
    // =========================================================================

    pub fn active(&self) -> Option<&ActiveItem> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.id.as_str())
    }

    pub fn is_active(&self, item_id: &str) -> bool {
        self.active_id() == Some(item_id)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state_of(&self, item_id: &str) -> PlaybackState {
        self.states.get(item_id).copied().unwrap_or(PlaybackState::Idle)
    }

    pub fn is_suspended(&self) -> bool {
        !(self.app_active && self.screen_focused)
    }

    pub fn has_deferred_play(&self) -> bool {
        self.deferred_play.is_some()
    }

    pub fn is_current(&self, token: &PlaybackToken) -> bool {
        token.version == self.version && self.is_active(&token.item_id)
    }

    /// The last [`TRANSITION_HISTORY`] state changes, oldest first.
    pub fn transitions(&self) -> &VecDeque<Transition> {
        &self.transitions
    }

    pub fn take_transitions(&mut self) -> Vec<Transition> {
        self.transitions.drain(..).collect()
    }

    /// Forgets all per-item state, e.g. on a full feed reload.
    pub fn reset(&mut self) {
        self.bump_version();
        self.active = None;
        self.deferred_play = None;
        self.suspended = None;
        self.states.clear();
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Asks for the active item to play, or defers until its mount completes.
    pub fn request_play(&mut self, resources: &ResourceLifecycleManager, out: &mut Vec<ResourceCommand>) {
        let Some(active) = self.active.clone() else {
            return;
        };
        if self.is_suspended() {
            self.suspended = Some(active.id);
            return;
        }

        let token = self.token_for(&active.id);
        if resources.is_ready(&active.id) {
            let muted = resources.handle(&active.id).map(|handle| handle.muted).unwrap_or(false);
            self.set_state(&active.id, PlaybackState::Loading);
            out.push(ResourceCommand::Play { token, muted });
        } else {
            log::debug!("Deferring play of {} until its resource is mounted", active.id);
            self.deferred_play = Some(token);
        }
    }

    fn try_resume(&mut self, resources: &ResourceLifecycleManager, out: &mut Vec<ResourceCommand>) {
        if self.is_suspended() {
            return;
        }
        let Some(suspended) = self.suspended.take() else {
            return;
        };
        if self.is_active(&suspended) {
            log::debug!("Resuming {}", suspended);
            self.bump_version();
            self.request_play(resources, out);
        } else {
            log::debug!("Not resuming {}: no longer the active item", suspended);
        }
    }

    fn suspend_active(&mut self, out: &mut Vec<ResourceCommand>) {
        self.deferred_play = None;
        if let Some(active) = self.active.clone() {
            self.force_pause(&active.id, out);
            self.suspended = Some(active.id);
            self.bump_version();
        }
    }

    fn pause_all(&mut self, out: &mut Vec<ResourceCommand>) {
        let mut targets: Vec<ItemId> = self
            .states
            .iter()
            .filter(|(_, state)| **state == PlaybackState::Playing)
            .map(|(id, _)| id.clone())
            .collect();
        if let Some(active) = &self.active {
            targets.push(active.id.clone());
        }
        for item_id in targets {
            self.force_pause(&item_id, out);
        }
    }

    fn force_pause(&mut self, item_id: &str, out: &mut Vec<ResourceCommand>) {
        let state = self.state_of(item_id);
        if matches!(state, PlaybackState::Playing | PlaybackState::Loading) {
            out.push(ResourceCommand::Pause {
                token: self.token_for(item_id),
            });
            self.set_state(item_id, PlaybackState::Paused);
        }
    }

    fn token_for(&self, item_id: &str) -> PlaybackToken {
        PlaybackToken {
            item_id: item_id.to_string(),
            version: self.version,
        }
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    fn set_state(&mut self, item_id: &str, to: PlaybackState) {
        let from = self.state_of(item_id);
        if from == to {
            return;
        }
        self.states.insert(item_id.to_string(), to);
        if self.transitions.len() == TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(Transition {
            item_id: item_id.to_string(),
            from,
            to,
        });
    }
}

impl Default for PlaybackArbiter {
    fn default() -> Self {
        Self::new()
    }
}
