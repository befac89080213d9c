use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::ads::DisplaySequence;
use crate::core::{AdConfig, FeedItem, Reel};

/// Per-session ad counters. Created when the feed screen opens, dropped when it
/// is torn down; never persisted.
#[derive(Debug, Clone)]
pub struct SessionAdState {
    pub session_id: uuid::Uuid,
    pub started_at: Instant,
    pub shown_count: usize,
    pub allowed_after_delay: bool,
    pub reels_watched: usize,
}

impl SessionAdState {
    pub fn new(now: Instant) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4(),
            started_at: now,
            shown_count: 0,
            allowed_after_delay: false,
            reels_watched: 0,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// Decides where sponsored slots go in the display sequence.
pub struct AdInterleaver {
    config: AdConfig,
    session: SessionAdState,
    watched_reels: HashSet<String>,
    impressed_slots: HashSet<usize>,
}

impl AdInterleaver {
    pub fn new(config: AdConfig, now: Instant) -> Self {
        Self {
            config,
            session: SessionAdState::new(now),
            watched_reels: HashSet::new(),
            impressed_slots: HashSet::new(),
        }
    }

    pub fn session(&self) -> &SessionAdState {
        &self.session
    }

    /// Starts a fresh session, discarding all counters.
    pub fn reset(&mut self, now: Instant) {
        log::debug!("Ad session {} ended after {} impressions", self.session.session_id, self.session.shown_count);
        self.session = SessionAdState::new(now);
        self.watched_reels.clear();
        self.impressed_slots.clear();
    }

    /// Counts a reel as watched. Returns true if it was not counted before.
    pub fn record_reel_watched(&mut self, reel_id: &str) -> bool {
        if self.watched_reels.insert(reel_id.to_string()) {
            self.session.reels_watched = self.watched_reels.len();
            true
        } else {
            false
        }
    }

    /// Both gates must hold: enough reels watched and enough session time.
    pub fn is_eligible(&mut self, now: Instant) -> bool {
        if !self.session.allowed_after_delay && self.session.elapsed(now) >= self.config.min_session() {
            self.session.allowed_after_delay = true;
        }
        self.session.allowed_after_delay && self.session.reels_watched >= self.config.min_reels_watched
    }

    pub fn remaining_budget(&self) -> usize {
        self.config.max_per_session.saturating_sub(self.session.shown_count)
    }

    /// Builds the display sequence for `reels`.
    pub fn build(&mut self, reels: &[Reel], now: Instant) -> DisplaySequence {
        if !self.is_eligible(now) {
            return DisplaySequence::reels_only(reels);
        }

        let interval = self.config.interval.max(1);
        let mut items = Vec::with_capacity(reels.len() + self.config.max_per_session);
        let mut inserted = 0;
        let mut unseen_inserted = 0;
        let mut exhausted = false;

        for (i, reel) in reels.iter().enumerate() {
            items.push(FeedItem::Reel(reel.clone()));

            let is_last = i + 1 == reels.len();
            if exhausted || (i + 1) % interval != 0 || is_last {
                continue;
            }

            // Slots already seen keep their place; unseen ones are limited by
            // what is left of the session budget.
            let ad_index = inserted;
            if self.impressed_slots.contains(&ad_index) {
                items.push(FeedItem::AdSlot { ad_index });
                inserted += 1;
            } else if self.session.shown_count + unseen_inserted < self.config.max_per_session {
                items.push(FeedItem::AdSlot { ad_index });
                inserted += 1;
                unseen_inserted += 1;
            } else {
                exhausted = true;
            }
        }

        if inserted > 0 {
            log::debug!("Interleaved {} ad slots into {} reels", inserted, reels.len());
        }
        DisplaySequence::from_items(items)
    }

    /// Reported by the ad renderer when a slot is actually seen. Returns true
    /// when the impression consumed budget.
    pub fn on_impression(&mut self, ad_index: usize, now: Instant) -> bool {
        if !self.is_eligible(now) {
            log::warn!("Ignoring impression for ad slot {} before ads are eligible", ad_index);
            return false;
        }
        if self.session.shown_count >= self.config.max_per_session {
            log::debug!("Ad budget exhausted, impression for slot {} not counted", ad_index);
            return false;
        }
        if !self.impressed_slots.insert(ad_index) {
            return false;
        }
        self.session.shown_count += 1;
        log::info!(
            "Ad impression {}/{} in session {}",
            self.session.shown_count,
            self.config.max_per_session,
            self.session.session_id
        );
        true
    }

    /// Maps a source reel index to its position in a sequence built with
    /// `inserted_ads` slots.
    pub fn display_index(&self, reel_index: usize, inserted_ads: usize) -> usize {
        reel_index + (reel_index / self.config.interval.max(1)).min(inserted_ads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reels(count: usize) -> Vec<Reel> {
        (0..count)
            .map(|i| Reel::new(format!("r{}", i), "owner", format!("https://cdn/r{}.mp4", i)))
            .collect()
    }

    fn eligible_interleaver(start: Instant) -> AdInterleaver {
        let mut interleaver = AdInterleaver::new(AdConfig::default(), start);
        for i in 0..5 {
            interleaver.record_reel_watched(&format!("r{}", i));
        }
        interleaver
    }

    fn ad_positions(sequence: &DisplaySequence) -> Vec<usize> {
        sequence
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_ad())
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_twelve_reels_get_two_slots() {
        let start = Instant::now();
        let mut interleaver = eligible_interleaver(start);
        let sequence = interleaver.build(&reels(12), start + Duration::from_secs(21));

        assert_eq!(sequence.len(), 14);
        assert_eq!(sequence.inserted_ads(), 2);
        // After reel 4 (display 4) and reel 9 (display 10)
        assert_eq!(ad_positions(&sequence), vec![5, 11]);
        assert_eq!(sequence.get(4).and_then(|item| item.reel_id()), Some("r4"));
        assert_eq!(sequence.get(10).and_then(|item| item.reel_id()), Some("r9"));
    }

    #[test]
    fn test_never_inserts_after_last_reel() {
        let start = Instant::now();
        let mut interleaver = eligible_interleaver(start);
        let sequence = interleaver.build(&reels(10), start + Duration::from_secs(30));

        assert_eq!(ad_positions(&sequence), vec![5]);
        assert!(!sequence.items().last().map(FeedItem::is_ad).unwrap_or(true));
    }

    #[test]
    fn test_caps_at_max_ads() {
        let start = Instant::now();
        let mut interleaver = eligible_interleaver(start);
        let sequence = interleaver.build(&reels(40), start + Duration::from_secs(30));
        assert_eq!(sequence.inserted_ads(), 3);
    }

    #[test]
    fn test_no_ads_until_both_gates_hold() {
        let start = Instant::now();

        // Enough reels, not enough time
        let mut interleaver = eligible_interleaver(start);
        assert_eq!(interleaver.build(&reels(12), start + Duration::from_secs(19)).inserted_ads(), 0);

        // Enough time, not enough reels
        let mut interleaver = AdInterleaver::new(AdConfig::default(), start);
        for i in 0..4 {
            interleaver.record_reel_watched(&format!("r{}", i));
        }
        assert_eq!(interleaver.build(&reels(12), start + Duration::from_secs(60)).inserted_ads(), 0);
    }

    #[test]
    fn test_rewatching_does_not_count_twice() {
        let start = Instant::now();
        let mut interleaver = AdInterleaver::new(AdConfig::default(), start);
        assert!(interleaver.record_reel_watched("r1"));
        assert!(!interleaver.record_reel_watched("r1"));
        assert_eq!(interleaver.session().reels_watched, 1);
    }

    #[test]
    fn test_impressions_consume_budget_and_shrink_rebuilds() {
        let start = Instant::now();
        let now = start + Duration::from_secs(30);
        let mut interleaver = eligible_interleaver(start);

        assert!(interleaver.on_impression(0, now));
        // Seeing the same slot again is free
        assert!(!interleaver.on_impression(0, now));
        assert_eq!(interleaver.session().shown_count, 1);
        assert_eq!(interleaver.remaining_budget(), 2);

        // The seen slot keeps its place and two unseen slots follow it
        let sequence = interleaver.build(&reels(40), now);
        assert_eq!(sequence.inserted_ads(), 3);
        assert_eq!(ad_positions(&sequence), vec![5, 11, 17]);
    }

    #[test]
    fn test_shown_count_never_exceeds_max() {
        let start = Instant::now();
        let now = start + Duration::from_secs(30);
        let mut interleaver = eligible_interleaver(start);

        for ad_index in 0..10 {
            interleaver.on_impression(ad_index, now);
            assert!(interleaver.session().shown_count <= 3);
        }
        assert_eq!(interleaver.session().shown_count, 3);
        // Only the three seen slots remain; no unseen slot is added
        assert_eq!(interleaver.build(&reels(40), now).inserted_ads(), 3);
    }

    #[test]
    fn test_impression_ignored_when_ineligible() {
        let start = Instant::now();
        let mut interleaver = AdInterleaver::new(AdConfig::default(), start);
        assert!(!interleaver.on_impression(0, start + Duration::from_secs(60)));
        assert_eq!(interleaver.session().shown_count, 0);
    }

    #[test]
    fn test_display_index_mapping_matches_sequence() {
        let start = Instant::now();
        let mut interleaver = eligible_interleaver(start);
        let source = reels(12);
        let sequence = interleaver.build(&source, start + Duration::from_secs(21));

        for (reel_index, reel) in source.iter().enumerate() {
            let display = interleaver.display_index(reel_index, sequence.inserted_ads());
            assert_eq!(sequence.position_of(&reel.id), Some(display), "reel {}", reel_index);
            assert_eq!(sequence.reel_index_of(display), Some(reel_index));
        }
    }

    #[test]
    fn test_reset_starts_new_session() {
        let start = Instant::now();
        let now = start + Duration::from_secs(30);
        let mut interleaver = eligible_interleaver(start);
        interleaver.on_impression(0, now);
        let old_session = interleaver.session().session_id;

        interleaver.reset(now);
        assert_ne!(interleaver.session().session_id, old_session);
        assert_eq!(interleaver.session().shown_count, 0);
        assert_eq!(interleaver.session().reels_watched, 0);
        assert!(!interleaver.is_eligible(now));
    }
}
