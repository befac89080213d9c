use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use crate::ads::DisplaySequence;
use crate::core::{FeedItem, ItemId, ResourceConfig};
use crate::error::{LoadError, LoadErrorKind};
use crate::playback::{PlaybackToken, ResourceCommand, UrlCache};

/// A mounted decoder resource for one feed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHandle {
    pub item_id: ItemId,
    pub display_index: usize,
    pub locator: String,
    pub mounted_at: Instant,
    pub is_active: bool,
    pub muted: bool,
    /// The host reported the mount as complete.
    pub ready: bool,
}

/// What happens to an item after its resource failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorOutcome {
    /// Active item with an expired locator: refetch it, then remount.
    RefreshLocator,
    /// Active item with a transient failure: remount after the delay.
    RetryAfter(Duration),
    /// Not active; remounted when it re-enters the window.
    Unmounted,
}

/// Result of reconciling mounted resources against the window.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WindowChange {
    pub mounted: Vec<ItemId>,
    pub unmounted: Vec<ItemId>,
}

/// Owns every mounted [`ResourceHandle`], keyed by item id. Handles are only
/// ever created by [`ResourceLifecycleManager::sync_window`] and removed
/// explicitly, so the set of live decoders is always visible here.
pub struct ResourceLifecycleManager {
    handles: BTreeMap<ItemId, ResourceHandle>,
    mount_distance: usize,
    transient_retry: Duration,
    awaiting_refresh: HashSet<ItemId>,
}

impl ResourceLifecycleManager {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            handles: BTreeMap::new(),
            mount_distance: config.mount_distance,
            transient_retry: config.transient_retry_delay(),
            awaiting_refresh: HashSet::new(),
        }
    }

    /// Mounts reels within the mount distance of `center` and tears down
    /// everything else.
    #[allow(clippy::too_many_arguments)]
    pub fn sync_window(
        &mut self,
        center: Option<usize>,
        sequence: &DisplaySequence,
        cache: &mut UrlCache,
        quality_hint: &str,
        version: u64,
        now: Instant,
        out: &mut Vec<ResourceCommand>,
    ) -> WindowChange {
        let mut change = WindowChange::default();

        // Teardown first so the mounted count never exceeds the window.
        let stale: Vec<ItemId> = self
            .handles
            .values()
            .filter(|handle| match (center, sequence.position_of(&handle.item_id)) {
                (Some(center), Some(index)) => index.abs_diff(center) > self.mount_distance,
                _ => true,
            })
            .map(|handle| handle.item_id.clone())
            .collect();

        for item_id in stale {
            self.teardown(&item_id, version, out);
            change.unmounted.push(item_id);
        }

        let Some(center) = center else {
            return change;
        };
        if sequence.is_empty() {
            return change;
        }

        let first = center.saturating_sub(self.mount_distance);
        let last = (center + self.mount_distance).min(sequence.len() - 1);

        for index in first..=last {
            let Some(FeedItem::Reel(reel)) = sequence.get(index) else {
                continue;
            };

            if let Some(handle) = self.handles.get_mut(&reel.id) {
                handle.display_index = index;
                continue;
            }
            if self.awaiting_refresh.contains(&reel.id) {
                log::debug!("Not mounting {} while its locator is being refreshed", reel.id);
                continue;
            }

            let locator = cache.get(&reel.id, reel.primary_locator().unwrap_or_default(), quality_hint, now);
            if locator.is_empty() {
                log::warn!("Cannot mount {}: no locator available", reel.id);
                continue;
            }

            log::debug!("Mounting {} at display index {}", reel.id, index);
            out.push(ResourceCommand::Mount {
                item_id: reel.id.clone(),
                locator: locator.clone(),
                muted: reel.music_present,
            });
            self.handles.insert(
                reel.id.clone(),
                ResourceHandle {
                    item_id: reel.id.clone(),
                    display_index: index,
                    locator,
                    mounted_at: now,
                    is_active: false,
                    muted: reel.music_present,
                    ready: false,
                },
            );
            change.mounted.push(reel.id.clone());
        }

        change
    }

    /// Marks `item_id` as the single active handle; every other handle is
    /// cleared.
    pub fn set_active(&mut self, item_id: Option<&str>) {
        for handle in self.handles.values_mut() {
            handle.is_active = Some(handle.item_id.as_str()) == item_id;
        }
    }

    /// Host finished mounting. Returns false when the handle was torn down in
    /// the meantime; the late decoder is released.
    pub fn on_mounted(&mut self, item_id: &str, out: &mut Vec<ResourceCommand>) -> bool {
        match self.handles.get_mut(item_id) {
            Some(handle) => {
                handle.ready = true;
                true
            }
            None => {
                log::debug!("Mount of {} completed after teardown, releasing", item_id);
                out.push(ResourceCommand::Release {
                    item_id: item_id.to_string(),
                });
                false
            }
        }
    }

    /// Handles a failed load: the cached locator is always dropped and the
    /// handle is removed.
    pub fn on_load_error(
        &mut self,
        item_id: &str,
        error: &LoadError,
        is_active: bool,
        cache: &mut UrlCache,
        out: &mut Vec<ResourceCommand>,
    ) -> LoadErrorOutcome {
        cache.invalidate(item_id);

        if self.handles.remove(item_id).is_some() {
            out.push(ResourceCommand::Release {
                item_id: item_id.to_string(),
            });
        }

        if !is_active {
            log::debug!("Load of inactive {} failed ({}), leaving it unmounted", item_id, error);
            return LoadErrorOutcome::Unmounted;
        }

        match error.classify() {
            LoadErrorKind::ExpiredLocator => {
                log::warn!("Locator for {} rejected ({}), refreshing", item_id, error);
                self.awaiting_refresh.insert(item_id.to_string());
                LoadErrorOutcome::RefreshLocator
            }
            LoadErrorKind::Transient => {
                log::warn!(
                    "Transient load failure for {} ({}), retrying in {:?}",
                    item_id,
                    error,
                    self.transient_retry
                );
                LoadErrorOutcome::RetryAfter(self.transient_retry)
            }
        }
    }

    /// A refreshed locator arrived (or the refresh failed); the item may be
    /// mounted again.
    pub fn clear_refresh(&mut self, item_id: &str) -> bool {
        self.awaiting_refresh.remove(item_id)
    }

    pub fn is_awaiting_refresh(&self, item_id: &str) -> bool {
        self.awaiting_refresh.contains(item_id)
    }

    /// Teardown failures are reported after the handle is already gone.
    pub fn on_teardown_failed(&self, item_id: &str, error: &str) {
        log::warn!("Teardown of {} failed, handle already released: {}", item_id, error);
    }

    /// Pause and release best-effort, then drop the handle regardless.
    pub fn teardown(&mut self, item_id: &str, version: u64, out: &mut Vec<ResourceCommand>) {
        if self.handles.remove(item_id).is_none() {
            return;
        }
        log::debug!("Unmounting {}", item_id);
        out.push(ResourceCommand::Pause {
            token: PlaybackToken {
                item_id: item_id.to_string(),
                version,
            },
        });
        out.push(ResourceCommand::Release {
            item_id: item_id.to_string(),
        });
    }

    /// Tears down every handle, e.g. when the feed screen goes away.
    pub fn teardown_all(&mut self, version: u64, out: &mut Vec<ResourceCommand>) -> Vec<ItemId> {
        let ids: Vec<ItemId> = self.handles.keys().cloned().collect();
        for item_id in &ids {
            self.teardown(item_id, version, out);
        }
        self.awaiting_refresh.clear();
        ids
    }

    pub fn handle(&self, item_id: &str) -> Option<&ResourceHandle> {
        self.handles.get(item_id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.handles.values()
    }

    pub fn is_mounted(&self, item_id: &str) -> bool {
        self.handles.contains_key(item_id)
    }

    pub fn is_ready(&self, item_id: &str) -> bool {
        self.handles.get(item_id).map(|handle| handle.ready).unwrap_or(false)
    }

    pub fn mounted_count(&self) -> usize {
        self.handles.len()
    }

    pub fn active_count(&self) -> usize {
        self.handles.values().filter(|handle| handle.is_active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Reel, UrlCacheConfig};

    fn sequence(count: usize) -> DisplaySequence {
        let reels: Vec<Reel> = (0..count)
            .map(|i| Reel::new(format!("r{}", i), "owner", format!("https://cdn/r{}.mp4", i)))
            .collect();
        DisplaySequence::reels_only(&reels)
    }

    fn setup() -> (ResourceLifecycleManager, UrlCache) {
        (
            ResourceLifecycleManager::new(&ResourceConfig::default()),
            UrlCache::new(&UrlCacheConfig::default()),
        )
    }

    fn mounted_ids(manager: &ResourceLifecycleManager) -> Vec<String> {
        manager.handles().map(|handle| handle.item_id.clone()).collect()
    }

    #[test]
    fn test_mounts_active_and_neighbours() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(6);
        let mut out = Vec::new();

        let change = manager.sync_window(Some(2), &seq, &mut cache, "", 1, Instant::now(), &mut out);

        assert_eq!(change.mounted, vec!["r1", "r2", "r3"]);
        assert_eq!(mounted_ids(&manager), vec!["r1", "r2", "r3"]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|cmd| matches!(cmd, ResourceCommand::Mount { .. })));
    }

    #[test]
    fn test_mount_is_idempotent() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(6);
        let now = Instant::now();
        let mut out = Vec::new();

        manager.sync_window(Some(2), &seq, &mut cache, "", 1, now, &mut out);
        out.clear();
        let change = manager.sync_window(Some(2), &seq, &mut cache, "", 1, now, &mut out);

        assert!(change.mounted.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn test_moving_window_tears_down_far_handles() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(8);
        let now = Instant::now();
        let mut out = Vec::new();

        manager.sync_window(Some(1), &seq, &mut cache, "", 1, now, &mut out);
        out.clear();
        let change = manager.sync_window(Some(4), &seq, &mut cache, "", 2, now, &mut out);

        assert_eq!(change.unmounted, vec!["r0", "r1", "r2"]);
        assert_eq!(mounted_ids(&manager), vec!["r3", "r4", "r5"]);
        assert!(out.contains(&ResourceCommand::Release { item_id: "r0".to_string() }));
        assert!(out.contains(&ResourceCommand::Pause {
            token: PlaybackToken { item_id: "r2".to_string(), version: 2 }
        }));
    }

    #[test]
    fn test_mounted_iff_within_distance() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(10);
        let now = Instant::now();
        let mut out = Vec::new();

        for center in [0usize, 3, 4, 9, 5, 1, 2, 8] {
            manager.sync_window(Some(center), &seq, &mut cache, "", 1, now, &mut out);
            for index in 0..seq.len() {
                let id = format!("r{}", index);
                assert_eq!(
                    manager.is_mounted(&id),
                    index.abs_diff(center) <= 1,
                    "center {} index {}",
                    center,
                    index
                );
            }
        }
    }

    #[test]
    fn test_music_reels_mount_muted() {
        let (mut manager, mut cache) = setup();
        let mut reel = Reel::new("r0", "owner", "https://cdn/r0.mp4");
        reel.music_present = true;
        let seq = DisplaySequence::reels_only(&[reel]);
        let mut out = Vec::new();

        manager.sync_window(Some(0), &seq, &mut cache, "", 1, Instant::now(), &mut out);

        assert!(matches!(&out[0], ResourceCommand::Mount { muted: true, .. }));
        assert!(manager.handle("r0").map(|handle| handle.muted).unwrap_or(false));
    }

    #[test]
    fn test_reel_without_locator_is_not_mounted() {
        let (mut manager, mut cache) = setup();
        let seq = DisplaySequence::reels_only(&[Reel::new("r0", "owner", "")]);
        let mut out = Vec::new();

        manager.sync_window(Some(0), &seq, &mut cache, "", 1, Instant::now(), &mut out);
        assert_eq!(manager.mounted_count(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_active_handle() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(5);
        let mut out = Vec::new();
        manager.sync_window(Some(2), &seq, &mut cache, "", 1, Instant::now(), &mut out);

        manager.set_active(Some("r2"));
        assert_eq!(manager.active_count(), 1);
        manager.set_active(Some("r3"));
        assert_eq!(manager.active_count(), 1);
        assert!(manager.handle("r3").map(|handle| handle.is_active).unwrap_or(false));
        manager.set_active(None);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_late_mount_is_released() {
        let (mut manager, _) = setup();
        let mut out = Vec::new();
        assert!(!manager.on_mounted("ghost", &mut out));
        assert_eq!(out, vec![ResourceCommand::Release { item_id: "ghost".to_string() }]);
    }

    #[test]
    fn test_expired_error_on_active_requests_refresh() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(3);
        let now = Instant::now();
        let mut out = Vec::new();
        manager.sync_window(Some(1), &seq, &mut cache, "", 1, now, &mut out);
        out.clear();

        let outcome = manager.on_load_error("r1", &LoadError::new("forbidden").with_code(403), true, &mut cache, &mut out);

        assert_eq!(outcome, LoadErrorOutcome::RefreshLocator);
        assert!(cache.peek("r1").is_none());
        assert!(!manager.is_mounted("r1"));
        assert!(manager.is_awaiting_refresh("r1"));

        // Not remounted until the refresh clears
        manager.sync_window(Some(1), &seq, &mut cache, "", 1, now, &mut out);
        assert!(!manager.is_mounted("r1"));
        assert!(manager.clear_refresh("r1"));
        manager.sync_window(Some(1), &seq, &mut cache, "", 1, now, &mut out);
        assert!(manager.is_mounted("r1"));
    }

    #[test]
    fn test_transient_error_on_active_retries() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(3);
        let mut out = Vec::new();
        manager.sync_window(Some(0), &seq, &mut cache, "", 1, Instant::now(), &mut out);

        let outcome = manager.on_load_error("r0", &LoadError::new("network timeout"), true, &mut cache, &mut out);
        assert_eq!(outcome, LoadErrorOutcome::RetryAfter(Duration::from_secs(1)));
    }

    #[test]
    fn test_error_on_inactive_unmounts() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(3);
        let mut out = Vec::new();
        manager.sync_window(Some(1), &seq, &mut cache, "", 1, Instant::now(), &mut out);

        let outcome = manager.on_load_error("r2", &LoadError::new("expired").with_code(403), false, &mut cache, &mut out);
        assert_eq!(outcome, LoadErrorOutcome::Unmounted);
        assert!(!manager.is_mounted("r2"));
        assert!(!manager.is_awaiting_refresh("r2"));
    }

    #[test]
    fn test_teardown_all_releases_everything() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(4);
        let mut out = Vec::new();
        manager.sync_window(Some(1), &seq, &mut cache, "", 1, Instant::now(), &mut out);
        out.clear();

        let removed = manager.teardown_all(3, &mut out);
        assert_eq!(removed.len(), 3);
        assert_eq!(manager.mounted_count(), 0);
        assert_eq!(out.iter().filter(|cmd| matches!(cmd, ResourceCommand::Release { .. })).count(), 3);
    }

    #[test]
    fn test_no_center_unmounts_everything() {
        let (mut manager, mut cache) = setup();
        let seq = sequence(4);
        let mut out = Vec::new();
        manager.sync_window(Some(1), &seq, &mut cache, "", 1, Instant::now(), &mut out);

        let change = manager.sync_window(None, &seq, &mut cache, "", 1, Instant::now(), &mut out);
        assert_eq!(change.unmounted.len(), 3);
        assert_eq!(manager.mounted_count(), 0);
    }
}
