use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use crate::core::UrlCacheConfig;

/// A minted locator and when it was minted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub locator: String,
    pub base_locator: String,
    pub minted_at: Instant,
    /// Set once the entry has been served inside the grace window; the next
    /// lookup mints a replacement.
    pub refresh_pending: bool,
}

impl CacheEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.minted_at)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlCacheStats {
    pub hits: u64,
    pub grace_hits: u64,
    pub mints: u64,
    pub invalidations: u64,
}

/// TTL-bounded cache of time-limited locators keyed by item id.
pub struct UrlCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
    grace: Duration,
    stats: UrlCacheStats,
}

impl UrlCache {
    pub fn new(config: &UrlCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl: config.ttl(),
            grace: config.refresh_grace().min(config.ttl()),
            stats: UrlCacheStats::default(),
        }
    }

    /// Returns a locator for `item_id` that is younger than the TTL, minting a
    /// new one when needed. An empty base locator yields an empty string,
    /// which callers treat as "cannot mount".
    pub fn get(&mut self, item_id: &str, base_locator: &str, quality_hint: &str, now: Instant) -> String {
        let fresh_until = self.ttl - self.grace;

        if let Some(entry) = self.entries.get_mut(item_id) {
            let age = entry.age(now);
            let reusable = entry.base_locator == base_locator && !entry.refresh_pending && age < self.ttl;

            if reusable && age < fresh_until {
                self.stats.hits += 1;
                return entry.locator.clone();
            }
            if reusable {
                log::debug!("Locator for {} is {}s old, serving once before refresh", item_id, age.as_secs());
                entry.refresh_pending = true;
                self.stats.grace_hits += 1;
                return entry.locator.clone();
            }
        }

        self.entries.pop(item_id);
        self.mint(item_id, base_locator, quality_hint, now)
    }

    /// Peeks at the current entry without touching recency or policy state.
    pub fn peek(&self, item_id: &str) -> Option<&CacheEntry> {
        self.entries.peek(item_id)
    }

    /// Drops the entry unconditionally, e.g. after an expired or forbidden
    /// load error.
    pub fn invalidate(&mut self, item_id: &str) -> bool {
        let removed = self.entries.pop(item_id).is_some();
        if removed {
            self.stats.invalidations += 1;
            log::debug!("Invalidated cached locator for {}", item_id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> UrlCacheStats {
        self.stats
    }

    fn mint(&mut self, item_id: &str, base_locator: &str, quality_hint: &str, now: Instant) -> String {
        let base = base_locator.trim();
        if base.is_empty() {
            log::warn!("No upstream locator for {}, cannot mint", item_id);
            return String::new();
        }

        let locator = Self::decorate(base, quality_hint);
        self.entries.put(
            item_id.to_string(),
            CacheEntry {
                locator: locator.clone(),
                base_locator: base_locator.to_string(),
                minted_at: now,
                refresh_pending: false,
            },
        );
        self.stats.mints += 1;
        locator
    }

    fn decorate(base: &str, quality_hint: &str) -> String {
        let quality = quality_hint.trim();
        if quality.is_empty() {
            return base.to_string();
        }
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{}{}quality={}", base, separator, quality)
    }
}
