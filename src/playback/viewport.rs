use std::time::{Duration, Instant};

use crate::core::ViewportConfig;

/// A debounced change of the visible display index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleIndexChange {
    pub previous: Option<usize>,
    pub next: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    since: Instant,
}

/// Turns raw visibility samples into a single current visible index.
pub struct ViewportTracker {
    threshold: f32,
    min_dwell: Duration,
    current: Option<usize>,
    candidate: Option<Candidate>,
}

impl ViewportTracker {
    pub fn new(config: &ViewportConfig) -> Self {
        Self {
            threshold: config.visibility_threshold,
            min_dwell: config.min_dwell(),
            current: None,
            candidate: None,
        }
    }

    /// Feeds one visibility sample. Returns a change once the sampled index
    /// has been the qualified candidate for at least the dwell time.
    pub fn on_sample(&mut self, index: usize, visible_fraction: f32, now: Instant) -> Option<VisibleIndexChange> {
        if visible_fraction < self.threshold {
            if self.candidate.map(|candidate| candidate.index) == Some(index) {
                log::trace!("Index {} dropped below visibility threshold", index);
                self.candidate = None;
            }
            return None;
        }

        match self.candidate {
            Some(candidate) if candidate.index == index => {}
            _ => {
                self.candidate = Some(Candidate { index, since: now });
            }
        }
        self.tick(now)
    }

    /// Re-evaluates the candidate without a new sample, so a held position
    /// is reported once its dwell time elapses.
    pub fn tick(&mut self, now: Instant) -> Option<VisibleIndexChange> {
        let candidate = self.candidate?;
        if now.saturating_duration_since(candidate.since) < self.min_dwell {
            return None;
        }
        if self.current == Some(candidate.index) {
            return None;
        }

        let change = VisibleIndexChange {
            previous: self.current,
            next: candidate.index,
        };
        self.current = Some(candidate.index);
        log::debug!("Visible index {:?} -> {}", change.previous, change.next);
        Some(change)
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Forces the reported index, e.g. after the sequence was rebuilt and the
    /// same item moved to a new display position.
    pub fn set_current(&mut self, index: Option<usize>) {
        self.current = index;
        self.candidate = None;
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.candidate = None;
    }
}
